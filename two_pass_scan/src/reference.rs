//! Sequential scans that define the expected output of the parallel engine.

use itertools::Itertools;

/// `out[i] = seed ⊕ f(input[0]) ⊕ ... ⊕ f(input[i])`, with the seed omitted
/// when absent.
pub fn inclusive_scan<I, T, C, U>(input: &[I], combine: C, transform: U, seed: Option<T>) -> Vec<T>
where
    I: Copy,
    T: Copy,
    C: Fn(T, T) -> T,
    U: Fn(I) -> T,
{
    input
        .iter()
        .scan(seed, |acc, &x| {
            let value = transform(x);
            let next = match *acc {
                Some(acc) => combine(acc, value),
                None => value,
            };
            *acc = Some(next);
            Some(next)
        })
        .collect_vec()
}

/// `out[0] = seed` and `out[i] = out[i - 1] ⊕ f(input[i - 1])`.
pub fn exclusive_scan<I, T, C, U>(input: &[I], combine: C, transform: U, seed: T) -> Vec<T>
where
    I: Copy,
    T: Copy,
    C: Fn(T, T) -> T,
    U: Fn(I) -> T,
{
    input
        .iter()
        .scan(seed, |acc, &x| {
            let current = *acc;
            *acc = combine(current, transform(x));
            Some(current)
        })
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::{exclusive_scan, inclusive_scan};

    fn add(a: u32, b: u32) -> u32 {
        a + b
    }

    #[test]
    fn inclusive() {
        let input = vec![1u32, 2, 3, 4, 5];
        assert_eq!(inclusive_scan(&input, add, |x| x, None), vec![1, 3, 6, 10, 15]);
        assert_eq!(inclusive_scan(&input, add, |x| x, Some(10)), vec![11, 13, 16, 20, 25]);
    }

    #[test]
    fn exclusive() {
        let input = vec![1u32, 2, 3, 4, 5];
        assert_eq!(exclusive_scan(&input, add, |x| x, 0), vec![0, 1, 3, 6, 10]);
    }

    #[test]
    fn empty() {
        let input: Vec<u32> = vec![];
        assert!(inclusive_scan(&input, add, |x| x, None).is_empty());
        assert!(exclusive_scan(&input, add, |x| x, 0).is_empty());
    }
}
