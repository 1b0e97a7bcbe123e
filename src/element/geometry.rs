use crate::allocators::DimAllocator;
use crate::connectivity::{CellConnectivity, ReferenceCell};
use crate::element::ReferenceFiniteElement;
use crate::error::{to_f64, FemError};
use crate::quadrature;
use crate::util::real;
use crate::{Real, SmallDim};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, DefaultAllocator, Dyn, OMatrix, OPoint, OVector};
use serde::{Deserialize, Serialize};

/// Tolerances used when validating the reference-to-physical map of cells.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometrySettings {
    /// A cell is rejected if the ratio between its Jacobian determinant and the product of the
    /// lengths of the Jacobian columns drops below this value at any checked point.
    pub relative_tolerance: f64,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-12,
        }
    }
}

/// The degree 1 shape functions associated with the vertices of a reference cell.
///
/// Ordered like the vertices of the cell. These drive the reference-to-physical map of every
/// cell and are evaluated in closed form.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexBasis {
    shape: ReferenceCell,
}

impl VertexBasis {
    pub fn new(shape: ReferenceCell) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> ReferenceCell {
        self.shape
    }
}

impl<T: Real> ReferenceFiniteElement<T> for VertexBasis {
    fn reference_dim(&self) -> usize {
        self.shape.reference_dim()
    }

    fn num_nodes(&self) -> usize {
        self.shape.num_vertices()
    }

    fn populate_basis(&self, basis_values: &mut [T], reference_coords: &[T]) {
        assert_eq!(basis_values.len(), self.shape.num_vertices());
        assert_eq!(reference_coords.len(), self.shape.reference_dim());
        if self.shape.is_simplex() {
            basis_values[0] = reference_coords
                .iter()
                .fold(T::one(), |acc, &x| acc - x);
            basis_values[1..].copy_from_slice(reference_coords);
        } else {
            let half = real::<T>(0.5);
            for (v, value) in basis_values.iter_mut().enumerate() {
                *value = self
                    .shape
                    .reference_vertex(v)
                    .iter()
                    .zip(reference_coords)
                    .map(|(&c, &x)| half * (T::one() + real::<T>(c) * x))
                    .fold(T::one(), |acc, f| acc * f);
            }
        }
    }

    fn populate_basis_gradients(&self, basis_gradients: &mut DMatrix<T>, reference_coords: &[T]) {
        let d = self.shape.reference_dim();
        assert_eq!(basis_gradients.shape(), (d, self.shape.num_vertices()));
        assert_eq!(reference_coords.len(), d);
        if self.shape.is_simplex() {
            basis_gradients.fill(T::zero());
            for a in 0..d {
                basis_gradients[(a, 0)] = -T::one();
                basis_gradients[(a, a + 1)] = T::one();
            }
        } else {
            let half = real::<T>(0.5);
            for v in 0..self.shape.num_vertices() {
                let c = self.shape.reference_vertex(v);
                for a in 0..d {
                    basis_gradients[(a, v)] = (0..d)
                        .map(|b| {
                            if a == b {
                                half * real::<T>(c[b])
                            } else {
                                half * (T::one() + real::<T>(c[b]) * reference_coords[b])
                            }
                        })
                        .fold(T::one(), |acc, f| acc * f);
                }
            }
        }
    }
}

/// The result of mapping reference basis gradients to a physical point.
#[derive(Debug, Clone, PartialEq)]
pub struct Pushforward<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// The physical point.
    pub point: OPoint<T, D>,
    /// The `D x reference_dim` Jacobian of the reference-to-physical map.
    pub jacobian: OMatrix<T, D, Dyn>,
    /// The (positive) volume scaling of the map. This is `det J` for cells whose reference
    /// dimension equals the physical dimension and `sqrt(det(J^T J))` otherwise.
    pub determinant: T,
    /// Physical gradients of each basis function, one per column.
    pub gradients: OMatrix<T, D, Dyn>,
}

/// The geometry of a single cell: its shape and the physical coordinates of its vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    shape: ReferenceCell,
    vertices: Vec<OPoint<T, D>>,
}

impl<T, D> ElementGeometry<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn try_new(shape: ReferenceCell, vertices: Vec<OPoint<T, D>>) -> Result<Self, FemError> {
        if vertices.len() != shape.num_vertices() {
            return Err(FemError::DimensionMismatch {
                context: "element geometry vertices",
                expected: shape.num_vertices(),
                actual: vertices.len(),
            });
        }
        if shape.reference_dim() > D::dim() {
            return Err(FemError::topology(format!(
                "{:?} cells cannot be embedded in {} dimensions",
                shape,
                D::dim()
            )));
        }
        Ok(Self { shape, vertices })
    }

    /// Gathers the vertices of a cell from the given vertex array.
    ///
    /// # Panics
    ///
    /// Panics if a vertex index is out of bounds.
    pub fn from_connectivity(cell: &CellConnectivity, vertices: &[OPoint<T, D>]) -> Self {
        Self {
            shape: cell.shape(),
            vertices: cell
                .vertex_indices()
                .iter()
                .map(|&v| vertices[v].clone())
                .collect(),
        }
    }

    pub fn shape(&self) -> ReferenceCell {
        self.shape
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn reference_dim(&self) -> usize {
        self.shape.reference_dim()
    }

    pub fn map_reference_coords(&self, reference_coords: &[T]) -> OPoint<T, D> {
        let mut values = vec![T::zero(); self.vertices.len()];
        VertexBasis::new(self.shape).populate_basis(&mut values, reference_coords);
        map_with_shape_values(&self.vertices, &values)
    }

    /// The `D x reference_dim` Jacobian of the reference-to-physical map.
    pub fn reference_jacobian(&self, reference_coords: &[T]) -> OMatrix<T, D, Dyn> {
        let gradients = VertexBasis::new(self.shape).evaluate_basis_gradients(reference_coords);
        jacobian_from_shape_gradients(&self.vertices, &gradients)
    }

    /// Maps the values and reference gradients of a basis to the physical point corresponding
    /// to the given reference coordinates.
    ///
    /// Fails with [`FemError::DegenerateGeometry`] if the map is not invertible (or inverted)
    /// at the point, using the default [`GeometrySettings`].
    pub fn pushforward<B>(&self, basis: &B, reference_coords: &[T]) -> Result<Pushforward<T, D>, FemError>
    where
        B: ?Sized + ReferenceFiniteElement<T>,
    {
        self.pushforward_with_settings(basis, reference_coords, &GeometrySettings::default())
    }

    pub fn pushforward_with_settings<B>(
        &self,
        basis: &B,
        reference_coords: &[T],
        settings: &GeometrySettings,
    ) -> Result<Pushforward<T, D>, FemError>
    where
        B: ?Sized + ReferenceFiniteElement<T>,
    {
        let tolerance = real(settings.relative_tolerance);
        let jacobian = self.reference_jacobian(reference_coords);
        let reference_gradients = basis.evaluate_basis_gradients(reference_coords);
        let mut gradients = OMatrix::<T, D, Dyn>::zeros(basis.num_nodes());
        let determinant = physical_gradients(&jacobian, &reference_gradients, &mut gradients, tolerance)?;
        Ok(Pushforward {
            point: self.map_reference_coords(reference_coords),
            jacobian,
            determinant,
            gradients,
        })
    }

    /// Checks the map at the reference vertices and the reference barycenter.
    pub fn check(&self, settings: &GeometrySettings) -> Result<(), FemError> {
        let tolerance = real(settings.relative_tolerance);
        let barycenter: Vec<T> = self
            .shape
            .reference_barycenter()
            .iter()
            .map(|&x| real(x))
            .collect();
        let corners = (0..self.shape.num_vertices()).map(|v| {
            self.shape
                .reference_vertex(v)
                .iter()
                .map(|&x| real(x))
                .collect::<Vec<T>>()
        });
        for xi in std::iter::once(barycenter).chain(corners) {
            check_jacobian(&self.reference_jacobian(&xi), tolerance)?;
        }
        Ok(())
    }

    /// Outward unit normal of a local facet at a point given in reference coordinates of the
    /// facet.
    ///
    /// For cells embedded in a higher-dimensional space this is the outward conormal: the unit
    /// vector tangent to the cell and orthogonal to the facet.
    pub fn facet_normal(&self, local_facet: usize, facet_reference_coords: &[T]) -> Result<OVector<T, D>, FemError> {
        if local_facet >= self.shape.num_facets() {
            return Err(FemError::topology(format!(
                "local facet {} is out of bounds for {:?} cell",
                local_facet, self.shape
            )));
        }
        let (facet_values, facet_gradients) = match self.shape.facet_shape(local_facet) {
            Some(facet_shape) => {
                if facet_reference_coords.len() != facet_shape.reference_dim() {
                    return Err(FemError::DimensionMismatch {
                        context: "facet reference coordinates",
                        expected: facet_shape.reference_dim(),
                        actual: facet_reference_coords.len(),
                    });
                }
                let facet_basis = VertexBasis::new(facet_shape);
                (
                    ReferenceFiniteElement::<T>::evaluate_basis(&facet_basis, facet_reference_coords),
                    ReferenceFiniteElement::<T>::evaluate_basis_gradients(&facet_basis, facet_reference_coords),
                )
            }
            None => (DVector::from_element(1, T::one()), DMatrix::zeros(0, 1)),
        };

        let facet = self.shape.facets()[local_facet];
        let mut xi = vec![T::zero(); self.reference_dim()];
        for (&local_vertex, &psi) in facet.iter().zip(facet_values.iter()) {
            for (x, &c) in xi.iter_mut().zip(self.shape.reference_vertex(local_vertex)) {
                *x += psi * real::<T>(c);
            }
        }
        let facet_vertices: Vec<_> = facet.iter().map(|&v| self.vertices[v].clone()).collect();
        let facet_jacobian = jacobian_from_shape_gradients(&facet_vertices, &facet_gradients);
        let outward: Vec<T> = xi
            .iter()
            .zip(self.shape.reference_barycenter().iter())
            .map(|(&x, &c)| x - real::<T>(c))
            .collect();
        outward_unit_normal(&self.reference_jacobian(&xi), &facet_jacobian, &outward).ok_or(
            FemError::DegenerateGeometry {
                cell: None,
                determinant: 0.0,
            },
        )
    }

    /// Largest distance between any two vertices.
    pub fn diameter(&self) -> T {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(a, b)| (a - b).norm())
            .fold(T::zero(), |acc, distance| acc.max(distance))
    }

    pub fn barycenter(&self) -> OPoint<T, D> {
        let n = real::<T>(self.vertices.len() as f64);
        let sum = self
            .vertices
            .iter()
            .fold(OPoint::<T, D>::origin().coords, |acc, v| acc + &v.coords);
        OPoint::from(sum / n)
    }

    /// Volume (length, area) of the cell, integrated exactly for the multilinear map.
    pub fn measure(&self) -> Result<T, FemError> {
        self.measure_with_settings(&GeometrySettings::default())
    }

    pub fn measure_with_settings(&self, settings: &GeometrySettings) -> Result<T, FemError> {
        let rule = quadrature::rule::<T>(self.shape, 2 * self.shape.reference_dim())?;
        let tolerance = real(settings.relative_tolerance);
        let mut measure = T::zero();
        for (q, &w) in rule.weights().iter().enumerate() {
            let jacobian = self.reference_jacobian(rule.point(q));
            measure += w * check_jacobian(&jacobian, tolerance)?;
        }
        Ok(measure)
    }
}

/// Evaluates `sum_v N_v x_v` for shape function values `N_v`.
pub(crate) fn map_with_shape_values<T, D>(vertices: &[OPoint<T, D>], shape_values: &[T]) -> OPoint<T, D>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let coords = vertices
        .iter()
        .zip(shape_values)
        .fold(OPoint::<T, D>::origin().coords, |acc, (x, &n)| acc + &x.coords * n);
    OPoint::from(coords)
}

/// Evaluates `J = sum_v x_v (grad N_v)^T` for reference shape function gradients stored as
/// columns.
pub(crate) fn jacobian_from_shape_gradients<T, D>(
    vertices: &[OPoint<T, D>],
    shape_gradients: &DMatrix<T>,
) -> OMatrix<T, D, Dyn>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let d = shape_gradients.nrows();
    let mut jacobian = OMatrix::<T, D, Dyn>::zeros(d);
    for (v, x) in vertices.iter().enumerate() {
        for a in 0..d {
            let g = shape_gradients[(a, v)];
            for i in 0..D::dim() {
                jacobian[(i, a)] += x[i] * g;
            }
        }
    }
    jacobian
}

/// Returns the volume scaling of the map with the given Jacobian, or an error if the map is
/// degenerate.
///
/// The scaling is `det J` for square Jacobians and `sqrt(det(J^T J))` otherwise. The map is
/// degenerate when the scaling is not positive or is tiny relative to the lengths of the
/// Jacobian columns.
pub(crate) fn check_jacobian<T, D>(jacobian: &OMatrix<T, D, Dyn>, relative_tolerance: T) -> Result<T, FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let d = jacobian.ncols();
    if d == 0 {
        return Ok(T::one());
    }
    let determinant = if d == D::dim() {
        DMatrix::from_iterator(d, d, jacobian.iter().copied()).determinant()
    } else {
        jacobian.tr_mul(jacobian).determinant().sqrt()
    };
    let column_length_product = jacobian
        .column_iter()
        .fold(T::one(), |acc, column| acc * column.norm());
    let nondegenerate = column_length_product > T::zero() && determinant > relative_tolerance * column_length_product;
    if nondegenerate {
        Ok(determinant)
    } else {
        Err(FemError::DegenerateGeometry {
            cell: None,
            determinant: to_f64(determinant),
        })
    }
}

/// Projects the image `J_cell r` of a reference direction onto the orthogonal complement of the
/// facet tangent space and normalizes it. Returns `None` if nothing remains.
pub(crate) fn outward_unit_normal<T, D>(
    cell_jacobian: &OMatrix<T, D, Dyn>,
    facet_jacobian: &OMatrix<T, D, Dyn>,
    reference_direction: &[T],
) -> Option<OVector<T, D>>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    let mut t = OVector::<T, D>::zeros();
    for (column, &r) in cell_jacobian.column_iter().zip(reference_direction) {
        t += column * r;
    }
    if facet_jacobian.ncols() > 0 {
        let metric_inverse = facet_jacobian.tr_mul(facet_jacobian).try_inverse()?;
        let coefficients = metric_inverse * facet_jacobian.tr_mul(&t);
        t -= facet_jacobian * coefficients;
    }
    let norm = t.norm();
    (norm > T::zero()).then(|| t / norm)
}

/// Maps reference gradients (stored as columns) to physical gradients with `J^{-T}` for square
/// Jacobians, and with `J (J^T J)^{-1}` for cells embedded in a higher-dimensional space, which
/// yields tangential gradients.
///
/// Returns the volume scaling computed by [`check_jacobian`].
pub(crate) fn physical_gradients<T, D>(
    jacobian: &OMatrix<T, D, Dyn>,
    reference_gradients: &DMatrix<T>,
    physical_gradients: &mut OMatrix<T, D, Dyn>,
    relative_tolerance: T,
) -> Result<T, FemError>
where
    T: Real,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    assert_eq!(reference_gradients.nrows(), jacobian.ncols());
    assert_eq!(physical_gradients.ncols(), reference_gradients.ncols());
    let determinant = check_jacobian(jacobian, relative_tolerance)?;
    let d = jacobian.ncols();
    if d == 0 {
        physical_gradients.fill(T::zero());
        return Ok(determinant);
    }
    let degenerate = || FemError::DegenerateGeometry {
        cell: None,
        determinant: to_f64(determinant),
    };
    if d == D::dim() {
        // Solving with J^T directly keeps nearly flat cells accurate
        let square = DMatrix::from_iterator(d, d, jacobian.iter().copied());
        let solution = square
            .transpose()
            .lu()
            .solve(reference_gradients)
            .ok_or_else(degenerate)?;
        physical_gradients.copy_from(&solution);
        return Ok(determinant);
    }
    let metric_inverse = jacobian
        .tr_mul(jacobian)
        .try_inverse()
        .ok_or_else(degenerate)?;
    physical_gradients.copy_from(&(jacobian * (metric_inverse * reference_gradients)));
    Ok(determinant)
}
