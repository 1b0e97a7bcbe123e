use crate::allocators::DimAllocator;
use crate::{Real, SmallDim};
use nalgebra::storage::StorageMut;
use nalgebra::{DMatrix, DVector, DefaultAllocator, Dim, Matrix, OPoint, Scalar};

/// Converts an `f64` constant to the scalar type.
#[inline]
pub(crate) fn real<T: Real>(value: f64) -> T {
    nalgebra::convert(value)
}

/// Copies the strictly upper triangular part of a matrix to its lower triangular part.
pub(crate) fn clone_upper_to_lower<T, R, C, S>(matrix: &mut Matrix<T, R, C, S>)
where
    T: Scalar,
    R: Dim,
    C: Dim,
    S: StorageMut<T, R, C>,
{
    for j in 0..matrix.ncols() {
        for i in (j + 1)..matrix.nrows() {
            matrix[(i, j)] = matrix[(j, i)].clone();
        }
    }
}

/// Evaluates a scalar function at each point and collects the values in a global vector.
///
/// ```
/// use galerkin::util::global_vector_from_point_fn;
/// use galerkin::nalgebra::Point2;
///
/// let points = [Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)];
/// let u = global_vector_from_point_fn(&points, |x| x.x + x.y);
/// assert_eq!(u.as_slice(), &[3.0, 7.0]);
/// ```
pub fn global_vector_from_point_fn<T, D, F>(points: &[OPoint<T, D>], mut f: F) -> DVector<T>
where
    T: Real,
    D: SmallDim,
    F: FnMut(&OPoint<T, D>) -> T,
    DefaultAllocator: DimAllocator<T, D>,
{
    DVector::from_iterator(points.len(), points.iter().map(|x| f(x)))
}

/// Largest absolute difference between a matrix and its transpose.
pub fn symmetry_defect<T: Real>(matrix: &DMatrix<T>) -> T {
    assert_eq!(matrix.nrows(), matrix.ncols(), "matrix must be square");
    let mut defect = T::zero();
    for i in 0..matrix.nrows() {
        for j in (i + 1)..matrix.ncols() {
            defect = defect.max((matrix[(i, j)] - matrix[(j, i)]).abs());
        }
    }
    defect
}
