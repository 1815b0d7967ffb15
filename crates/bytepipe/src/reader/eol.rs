/// Incremental matcher for a literal line delimiter.
///
/// Bytes are fed one at a time, so a delimiter split across two refills is
/// still found. Matches are only reported when they start on a code-unit
/// boundary of the line, which keeps `"\n"` in UTF-16 from matching inside
/// an unrelated character.
#[derive(Debug)]
pub(crate) struct EolMatcher {
    pattern: Vec<u8>,
    /// KMP failure function over `pattern`.
    fallback: Vec<usize>,
    matched: usize,
    fed: usize,
    unit: usize,
}

impl EolMatcher {
    pub(crate) fn new(pattern: Vec<u8>, unit: usize) -> Self {
        debug_assert!(!pattern.is_empty());
        let mut fallback = vec![0; pattern.len()];
        let mut k = 0;
        for i in 1..pattern.len() {
            while k > 0 && pattern[i] != pattern[k] {
                k = fallback[k - 1];
            }
            if pattern[i] == pattern[k] {
                k += 1;
            }
            fallback[i] = k;
        }
        Self {
            pattern,
            fallback,
            matched: 0,
            fed: 0,
            unit: unit.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Forgets any partial match; call at the start of each line.
    pub(crate) fn reset(&mut self) {
        self.matched = 0;
        self.fed = 0;
    }

    /// Returns `true` when `byte` completes an aligned delimiter.
    pub(crate) fn feed(&mut self, byte: u8) -> bool {
        self.fed += 1;
        while self.matched > 0 && self.pattern[self.matched] != byte {
            self.matched = self.fallback[self.matched - 1];
        }
        if self.pattern[self.matched] == byte {
            self.matched += 1;
        }
        if self.matched == self.pattern.len() {
            self.matched = self.fallback[self.matched - 1];
            let start = self.fed - self.pattern.len();
            return start % self.unit == 0;
        }
        false
    }
}
