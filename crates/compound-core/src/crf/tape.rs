//! One training step's recording of differentiable computations.
//!
//! The dense weight vector is lifted into a single `candle_core::Var`; every
//! score built from it is recorded by candle's autograd. `gradients` runs the
//! backward pass from a scalar loss and consumes the tape, so no recording
//! outlives the step that created it.

use std::collections::BTreeMap;

use candle_core::{DType, Device, Result, Tensor, Var};

/// Sparse feature row resolved to dense ids.
pub(crate) type SparseRow = Vec<(usize, f64)>;

pub(crate) struct Tape {
    weights: Var,
    len: usize,
    device: Device,
}

impl Tape {
    /// Start a recording over a snapshot of `weights`.
    pub fn record(weights: &[f64]) -> Result<Self> {
        let device = Device::Cpu;
        let tensor = Tensor::from_slice(weights, weights.len(), &device)?;
        Ok(Self {
            weights: Var::from_tensor(&tensor)?,
            len: weights.len(),
            device,
        })
    }

    pub fn constant(&self, value: f64) -> Result<Tensor> {
        Tensor::new(value, &self.device)
    }

    pub fn constants(&self, values: Vec<f64>) -> Result<Tensor> {
        let n = values.len();
        Tensor::from_vec(values, n, &self.device)
    }

    pub fn matrix(&self, values: Vec<f64>, rows: usize, cols: usize) -> Result<Tensor> {
        Tensor::from_vec(values, (rows, cols), &self.device)
    }

    /// Entries of the 1-D tensor `t` at `ids`, in that order.
    pub fn select(&self, t: &Tensor, ids: &[usize]) -> Result<Tensor> {
        let raw: Vec<u32> = ids.iter().map(|&i| i as u32).collect();
        let index = Tensor::from_vec(raw, ids.len(), &self.device)?;
        t.index_select(&index, 0)
    }

    /// The weight with dense id `id`, as a scalar.
    pub fn weight(&self, id: usize) -> Result<Tensor> {
        self.weights.as_tensor().get(id)
    }

    /// Dot product of every row with the weights, as a 1-D tensor.
    ///
    /// Only the columns touched by `rows` are gathered, so the cost is
    /// proportional to the rows' support rather than the vocabulary size.
    pub fn dot_batch(&self, rows: &[SparseRow]) -> Result<Tensor> {
        if rows.is_empty() {
            return self.constants(Vec::new());
        }
        let mut columns: BTreeMap<usize, usize> = BTreeMap::new();
        for row in rows {
            for &(id, _) in row {
                let next = columns.len();
                columns.entry(id).or_insert(next);
            }
        }
        let n = rows.len();
        let width = columns.len();
        if width == 0 {
            return Tensor::zeros(n, DType::F64, &self.device);
        }

        let mut ids = vec![0usize; width];
        for (&id, &col) in &columns {
            ids[col] = id;
        }
        let mut values = vec![0.0; n * width];
        for (r, row) in rows.iter().enumerate() {
            for &(id, value) in row {
                values[r * width + columns[&id]] += value;
            }
        }

        let local = self
            .select(self.weights.as_tensor(), &ids)?
            .reshape((width, 1))?;
        self.matrix(values, n, width)?.matmul(&local)?.reshape(n)
    }

    /// Sum of squared weights.
    pub fn squared_norm(&self) -> Result<Tensor> {
        self.weights.as_tensor().sqr()?.sum_all()
    }

    /// Backward pass from `loss`; one gradient per weight.
    pub fn gradients(self, loss: &Tensor) -> Result<Vec<f64>> {
        let grads = loss.backward()?;
        match grads.get(self.weights.as_tensor()) {
            Some(g) => g.to_vec1::<f64>(),
            None => Ok(vec![0.0; self.len]),
        }
    }
}

/// `log(sum(exp(scores)))` of a 1-D tensor, shifted by its maximum.
pub(crate) fn log_sum_exp(scores: &Tensor) -> Result<Tensor> {
    let values = scores.to_vec1::<f64>()?;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Tensor::new(max, scores.device());
    }
    scores
        .affine(1.0, -max)?
        .exp()?
        .sum_all()?
        .log()?
        .affine(1.0, max)
}
