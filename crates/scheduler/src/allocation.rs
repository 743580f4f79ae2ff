/// Share `available` CPUs among `jobs` free jobs, one at a time in
/// round-robin order, so earlier jobs get the remainder.
///
/// Under isolation every job gets at most one CPU; leftover CPUs stay idle
/// until a running job frees its own.
pub fn allocate_cpus(available: usize, jobs: usize, isolation: bool) -> Vec<usize> {
    let mut allocation = vec![0; jobs];
    if jobs == 0 {
        return allocation;
    }
    let mut remaining = available;
    while remaining > 0 {
        for slot in allocation.iter_mut() {
            if isolation && *slot > 0 {
                return allocation;
            }
            *slot += 1;
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_favours_earlier_jobs() {
        assert_eq!(allocate_cpus(5, 3, false), vec![2, 2, 1]);
        assert_eq!(allocate_cpus(2, 3, false), vec![1, 1, 0]);
        assert_eq!(allocate_cpus(0, 2, false), vec![0, 0]);
    }

    #[test]
    fn isolation_caps_each_job_at_one() {
        assert_eq!(allocate_cpus(8, 3, true), vec![1, 1, 1]);
        assert_eq!(allocate_cpus(2, 3, true), vec![1, 1, 0]);
    }

    #[test]
    fn no_jobs_no_allocation() {
        assert!(allocate_cpus(4, 0, false).is_empty());
    }
}
