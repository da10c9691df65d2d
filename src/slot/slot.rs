use crate::core::errors::{RmsError, Result};
use crate::slot::dtype::{DType, Element};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct SlotInner {
    dtype: DType,
    /// Empty for scalars
    shape: Vec<usize>,
    cells: Box<[AtomicU64]>,
}

/// Fixed-type, fixed-shape storage for one variable.
///
/// Cloning a `Slot` clones the handle, not the storage: every clone observes
/// the same cells. Each element lives in its own atomic cell holding the
/// element's bit pattern, so a reader can never see a torn element. Ordering
/// between a producer's writes and its consumers' reads comes from the gate,
/// which is why every cell access here is `Relaxed`.
#[derive(Clone)]
pub struct Slot {
    inner: Arc<SlotInner>,
}

impl Slot {
    fn from_parts(dtype: DType, shape: Vec<usize>, len: usize, fill: u64) -> Self {
        let cells = (0..len).map(|_| AtomicU64::new(fill)).collect::<Vec<_>>();
        Self {
            inner: Arc::new(SlotInner {
                dtype,
                shape,
                cells: cells.into_boxed_slice(),
            }),
        }
    }

    /// Scalar slot holding `default`
    pub fn scalar<T: Element>(default: T) -> Self {
        Self::from_parts(T::DTYPE, Vec::new(), 1, default.to_bits())
    }

    /// Zero-filled array slot
    pub fn array<T: Element>(shape: &[usize]) -> Result<Self> {
        Self::zeroed(T::DTYPE, shape)
    }

    fn zeroed(dtype: DType, shape: &[usize]) -> Result<Self> {
        if shape.is_empty() {
            return Err(RmsError::invalid_argument(
                "array shape must have at least one dimension",
            ));
        }
        if shape.contains(&0) {
            return Err(RmsError::invalid_argument(format!(
                "array dimensions must be non-zero, got {:?}",
                shape
            )));
        }
        let len = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).ok_or_else(|| {
            RmsError::invalid_argument(format!("array shape {:?} overflows", shape))
        })?;
        Ok(Self::from_parts(dtype, shape.to_vec(), len, 0))
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    pub fn is_scalar(&self) -> bool {
        self.inner.shape.is_empty()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.inner.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cells.is_empty()
    }

    /// Storage size in bytes when laid out as a C array of the element type
    pub fn byte_size(&self) -> usize {
        self.len() * self.inner.dtype.size_of()
    }

    /// Whether both handles refer to the same storage
    pub fn same_storage(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn check_type<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.inner.dtype {
            return Err(RmsError::TypeMismatch {
                expected: T::DTYPE.name(),
                actual: self.inner.dtype.name(),
            });
        }
        Ok(())
    }

    fn check_scalar(&self) -> Result<()> {
        if !self.is_scalar() {
            return Err(RmsError::ShapeMismatch {
                expected: Vec::new(),
                actual: self.inner.shape.clone(),
            });
        }
        Ok(())
    }

    fn flat_index(&self, index: &[usize]) -> Result<usize> {
        let shape = &self.inner.shape;
        if index.len() != shape.len() || index.iter().zip(shape).any(|(i, d)| i >= d) {
            return Err(RmsError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: shape.clone(),
            });
        }
        // row-major
        Ok(index
            .iter()
            .zip(shape)
            .fold(0, |flat, (&i, &dim)| flat * dim + i))
    }

    /// Read a scalar value
    pub fn get<T: Element>(&self) -> Result<T> {
        self.check_type::<T>()?;
        self.check_scalar()?;
        Ok(T::from_bits(self.inner.cells[0].load(Ordering::Relaxed)))
    }

    /// Write a scalar value
    pub fn set<T: Element>(&self, value: T) -> Result<()> {
        self.check_type::<T>()?;
        self.check_scalar()?;
        self.inner.cells[0].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Read one array element
    pub fn get_at<T: Element>(&self, index: &[usize]) -> Result<T> {
        self.check_type::<T>()?;
        let flat = self.flat_index(index)?;
        Ok(T::from_bits(self.inner.cells[flat].load(Ordering::Relaxed)))
    }

    /// Write one array element
    pub fn set_at<T: Element>(&self, index: &[usize], value: T) -> Result<()> {
        self.check_type::<T>()?;
        let flat = self.flat_index(index)?;
        self.inner.cells[flat].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Copy every element out in row-major order
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.check_type::<T>()?;
        Ok(self
            .inner
            .cells
            .iter()
            .map(|cell| T::from_bits(cell.load(Ordering::Relaxed)))
            .collect())
    }

    /// Overwrite every element from a row-major buffer of matching length
    pub fn copy_from<T: Element>(&self, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        if values.len() != self.len() {
            return Err(RmsError::ShapeMismatch {
                expected: self.inner.shape.clone(),
                actual: vec![values.len()],
            });
        }
        for (cell, value) in self.inner.cells.iter().zip(values) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Current contents as JSON: a bare value for scalars, nested arrays otherwise
    pub fn to_json(&self) -> Value {
        let dtype = self.inner.dtype;
        let flat: Vec<Value> = self
            .inner
            .cells
            .iter()
            .map(|cell| dtype.bits_to_json(cell.load(Ordering::Relaxed)))
            .collect();
        if self.is_scalar() {
            return flat.into_iter().next().unwrap_or(Value::Null);
        }
        nest(&flat, &self.inner.shape)
    }
}

fn nest(flat: &[Value], shape: &[usize]) -> Value {
    match shape {
        [] | [_] => Value::Array(flat.to_vec()),
        [_, rest @ ..] => {
            let stride: usize = rest.iter().product();
            Value::Array(flat.chunks(stride).map(|chunk| nest(chunk, rest)).collect())
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("dtype", &self.inner.dtype)
            .field("shape", &self.inner.shape)
            .finish()
    }
}

/// Allocate a scalar slot from a dtype name such as `"float"` or `"uint8"`.
/// `default` is cast into the element type, so int64/uint64 defaults beyond
/// 2^53 are rounded; use [`Slot::scalar`] to set such a default exactly.
pub fn allocate_scalar(default: f64, dtype: &str) -> Result<Slot> {
    let dtype: DType = dtype.parse()?;
    Ok(Slot::from_parts(dtype, Vec::new(), 1, dtype.bits_from_f64(default)))
}

/// Allocate a zero-filled array slot from a dtype name
pub fn allocate_array(shape: &[usize], dtype: &str) -> Result<Slot> {
    let dtype: DType = dtype.parse()?;
    Slot::zeroed(dtype, shape)
}
