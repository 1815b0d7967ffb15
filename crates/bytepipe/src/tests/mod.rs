
/// QuickCheck iteration count, raised on CI and cut down by `test-fast`.
pub(crate) fn iterations(local: u64) -> u64 {
    if cfg!(feature = "test-fast") {
        (local / 10).max(1)
    } else if is_ci::cached() {
        local * 10
    } else {
        local
    }
}
