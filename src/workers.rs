//! Bounded worker pools for the parallel stages.

use rayon::ThreadPoolBuilder;

/// Parse a parallelism setting: `"auto"` or a positive integer.
pub fn parse_parallelism(value: &str) -> Result<usize, String> {
    if value.trim().eq_ignore_ascii_case("auto") {
        return Ok(available_threads());
    }
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be 'auto' or a positive integer, got '0'".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("must be 'auto' or a positive integer, got '{value}'")),
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `op` on a dedicated pool of `threads` workers.
///
/// Falls back to the global rayon pool if the dedicated pool cannot be built.
pub fn run_in_pool<R, F>(threads: usize, op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match ThreadPoolBuilder::new().num_threads(threads.max(1)).build() {
        Ok(pool) => pool.install(op),
        Err(err) => {
            log::warn!("failed to build worker pool of {threads} threads: {err}; using global pool");
            op()
        }
    }
}
