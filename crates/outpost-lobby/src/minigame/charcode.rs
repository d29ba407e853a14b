//! Pools of short character codes used as asteroid and player targets.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::seq::SliceRandom;

use crate::minigame::MinigameError;

/// The symbols codes are drawn from, split by case for display purposes.
pub struct SymbolSet {
    pub lowercase: &'static [char],
    pub uppercase: &'static [char],
}

impl SymbolSet {
    fn len(&self) -> usize {
        self.lowercase.len() + self.uppercase.len()
    }
}

pub const ENGLISH: SymbolSet = SymbolSet {
    lowercase: &[
        'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
        's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
    ],
    uppercase: &[
        'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
        'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    ],
};

pub const DANISH: SymbolSet = SymbolSet {
    lowercase: &[
        'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
        's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'æ', 'ø', 'å',
    ],
    uppercase: &[
        'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
        'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Æ', 'Ø', 'Å',
    ],
};

/// A shuffled cycle over a symbol set: every symbol is drawn once before
/// any symbol repeats, reshuffling on each full pass.
struct CharPool {
    symbols: Vec<char>,
    index: usize,
}

impl CharPool {
    fn new(set: &SymbolSet) -> Self {
        let mut symbols: Vec<char> = set
            .lowercase
            .iter()
            .chain(set.uppercase.iter())
            .copied()
            .collect();
        symbols.shuffle(&mut rand::rng());
        Self { symbols, index: 0 }
    }

    fn next_char(&mut self) -> char {
        if self.index >= self.symbols.len() {
            self.index = 0;
            self.symbols.shuffle(&mut rand::rng());
        }
        let c = self.symbols[self.index];
        self.index += 1;
        c
    }
}

struct PoolInner {
    code_length: u32,
    codes: Vec<String>,
    chars: CharPool,
}

impl PoolInner {
    fn generate(&mut self) -> String {
        (0..self.code_length).map(|_| self.chars.next_char()).collect()
    }
}

/// A thread-safe pool of unique character codes.
///
/// Starts with `initial_size` distinct codes of `code_length` symbols.
/// When drained, fresh codes are generated from the char cycle on demand;
/// freed codes go back into the pool.
pub struct CharCodePool {
    inner: Mutex<PoolInner>,
}

impl CharCodePool {
    /// Fails when the symbol set cannot express `initial_size` distinct
    /// codes of the requested length.
    pub fn new(
        initial_size: u32,
        code_length: u32,
        symbols: &SymbolSet,
    ) -> Result<Self, MinigameError> {
        let permutations = (symbols.len() as f64).powi(code_length as i32);
        if permutations < initial_size as f64 {
            return Err(MinigameError::PoolTooSmall {
                requested: initial_size,
                permutations,
            });
        }

        let mut inner = PoolInner {
            code_length,
            codes: Vec::with_capacity(initial_size as usize),
            chars: CharPool::new(symbols),
        };

        let mut seen = HashSet::with_capacity(initial_size as usize);
        while inner.codes.len() < initial_size as usize {
            let code = inner.generate();
            if seen.insert(code.clone()) {
                inner.codes.push(code);
            }
        }

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Pops a code, generating a fresh one when the pool is drained.
    pub fn next(&self) -> String {
        let mut inner = self.inner.lock().expect("char code pool lock poisoned");
        match inner.codes.pop() {
            Some(code) => code,
            None => inner.generate(),
        }
    }

    /// Returns a code to the pool.
    pub fn free(&self, code: String) {
        self.inner
            .lock()
            .expect("char code pool lock poisoned")
            .codes
            .push(code);
    }

    /// Codes currently available without generating.
    pub fn available(&self) -> usize {
        self.inner
            .lock()
            .expect("char code pool lock poisoned")
            .codes
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_set_sizes() {
        assert_eq!(ENGLISH.len(), 52);
        assert_eq!(DANISH.len(), 58);
    }

    #[test]
    fn test_char_pool_full_pass_before_repeat() {
        let mut pool = CharPool::new(&ENGLISH);
        let mut seen = HashSet::new();
        for _ in 0..52 {
            assert!(seen.insert(pool.next_char()), "symbol repeated within a pass");
        }
        // The next draw starts a fresh pass.
        assert!(seen.contains(&pool.next_char()));
    }

    #[test]
    fn test_new_rejects_impossible_initial_size() {
        // 52^1 = 52 < 100.
        let result = CharCodePool::new(100, 1, &ENGLISH);
        assert!(matches!(result, Err(MinigameError::PoolTooSmall { .. })));
    }

    #[test]
    fn test_initial_codes_are_unique_and_correct_length() {
        let pool = CharCodePool::new(100, 2, &ENGLISH).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let code = pool.next();
            assert_eq!(code.chars().count(), 2);
            assert!(seen.insert(code), "duplicate code in initial pool");
        }
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_drained_pool_keeps_generating() {
        let pool = CharCodePool::new(2, 2, &ENGLISH).unwrap();
        pool.next();
        pool.next();
        let extra = pool.next();
        assert_eq!(extra.chars().count(), 2);
    }

    #[test]
    fn test_free_returns_code_to_pool() {
        let pool = CharCodePool::new(1, 2, &ENGLISH).unwrap();
        let code = pool.next();
        assert_eq!(pool.available(), 0);
        pool.free(code.clone());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.next(), code);
    }

    #[test]
    fn test_pool_is_shareable_across_threads() {
        use std::sync::Arc;

        let pool = Arc::new(CharCodePool::new(64, 2, &ENGLISH).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let code = pool.next();
                    pool.free(code);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
