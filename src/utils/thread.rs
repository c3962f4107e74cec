use crate::Parallelism;

/// The amount of threads that should ideally execute an operation with the given parallelism.
#[inline]
pub fn parallelism_degree(parallelism: Parallelism) -> usize {
    match parallelism {
        Parallelism::None => 1,
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(0) => rayon::current_num_threads(),
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(n_threads) => n_threads,
    }
}

/// Executes the two operations, possibly in parallel, splitting the available threads between
/// them.
#[inline]
pub fn join_raw<A: Send, B: Send>(
    op_a: impl Send + FnOnce(Parallelism) -> A,
    op_b: impl Send + FnOnce(Parallelism) -> B,
    parallelism: Parallelism,
) -> (A, B) {
    match parallelism {
        Parallelism::None => (op_a(parallelism), op_b(parallelism)),
        #[cfg(feature = "rayon")]
        Parallelism::Rayon(_) => {
            let n_threads = parallelism_degree(parallelism);
            if n_threads == 1 {
                (op_a(Parallelism::None), op_b(Parallelism::None))
            } else {
                let parallelism = Parallelism::Rayon(n_threads - n_threads / 2);
                rayon::join(|| op_a(parallelism), || op_b(parallelism))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn join_runs_both_sides() {
        let (a, b) = join_raw(|_| 1, |_| 2, Parallelism::None);
        assert!(a + b == 3);
        #[cfg(feature = "rayon")]
        {
            let (a, b) = join_raw(
                |par| parallelism_degree(par),
                |par| parallelism_degree(par),
                Parallelism::Rayon(4),
            );
            assert!(all(a == 2, b == 2));
        }
    }
}
