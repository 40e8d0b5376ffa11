mod support;

use forkjoin_core::ops::join;
use forkjoin_core::sync_wait;
use support::{InlinePool, StaticPool};

/// Row-major, fixed 4x4 matrix.
#[derive(Clone, PartialEq, Debug)]
struct Mat4([[f64; 4]; 4]);

impl Mat4 {
    fn identity() -> Mat4 {
        let mut m = [[0.0; 4]; 4];
        for i in 0..4 {
            m[i][i] = 1.0;
        }
        Mat4(m)
    }

    fn permutation(perm: [usize; 4]) -> Mat4 {
        let mut m = [[0.0; 4]; 4];
        for (row, &col) in perm.iter().enumerate() {
            m[row][col] = 1.0;
        }
        Mat4(m)
    }
}

/// Forks one child per output row, joined pairwise — each row is
/// independent, so this exercises forking over borrowed matrix data.
fn matmul(a: &Mat4, b: &Mat4) -> Mat4 {
    fn row(a: &Mat4, b: &Mat4, i: usize) -> [f64; 4] {
        let mut out = [0.0; 4];
        for j in 0..4 {
            let mut acc = 0.0;
            for k in 0..4 {
                acc += a.0[i][k] * b.0[k][j];
            }
            out[j] = acc;
        }
        out
    }

    let ((r0, r1), (r2, r3)) = join(
        || join(|| row(a, b, 0), || row(a, b, 1)),
        || join(|| row(a, b, 2), || row(a, b, 3)),
    );
    Mat4([r0, r1, r2, r3])
}

#[test]
fn identity_times_identity_is_identity() {
    let identity = Mat4::identity();
    let pool = InlinePool::new();
    let expected = identity.clone();
    let result = sync_wait(&pool, move || matmul(&identity, &identity));
    assert_eq!(result, expected);
}

#[test]
fn permutation_product_matches_composed_permutation() {
    // [1,0,3,2] then [2,3,0,1] composed should route row i of the left
    // matrix through both permutations.
    let p = Mat4::permutation([1, 0, 3, 2]);
    let q = Mat4::permutation([2, 3, 0, 1]);
    for &workers in &[1usize, 2, 4] {
        let pool = StaticPool::new(workers);
        let (p, q) = (p.clone(), q.clone());
        let result = sync_wait(&pool, move || matmul(&p, &q));
        let expected = Mat4::permutation([3, 2, 1, 0]);
        assert_eq!(result, expected, "mismatch at worker count {}", workers);
    }
}
