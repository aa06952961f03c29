use std::cmp::Ordering;
use std::thread::available_parallelism;

use eyre::Result;

fn _resolve(requested: isize, max: usize) -> usize {
    let max = max.max(1);
    match requested.cmp(&0) {
        // -1 means all cores, -2 all but one, etc.
        Ordering::Less => max.saturating_sub(requested.unsigned_abs() - 1).max(1),
        Ordering::Equal => 1,
        Ordering::Greater => (requested as usize).min(max),
    }
}

/// Number of workers to launch for the requested amount. `None` means every available core,
/// negative values are counted back from the number of cores.
pub fn workers(requested: Option<isize>) -> Result<usize> {
    let max = available_parallelism()?.get();
    Ok(match requested {
        None => max,
        Some(requested) => _resolve(requested, max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_resolution() {
        for (requested, max, expected) in [
            (0, 8, 1),
            (1, 8, 1),
            (3, 8, 3),
            (8, 8, 8),
            (9, 8, 8),
            (4096, 8, 8),
            (-1, 8, 8),
            (-2, 8, 7),
            (-7, 8, 2),
            (-8, 8, 1),
            (-100, 8, 1),
            (2, 0, 1),
        ] {
            assert_eq!(_resolve(requested, max), expected, "requested {requested}");
        }
    }

    #[test]
    fn test_all_workers() -> Result<()> {
        assert_eq!(workers(None)?, available_parallelism()?.get());
        assert_eq!(workers(Some(-1))?, available_parallelism()?.get());
        Ok(())
    }
}
