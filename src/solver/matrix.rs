//! Dense admittance system assembly and solving.

use crate::error::Result;
use crate::network::NodeId;

/// Admittance system G·V = I over the non-ground nodes.
#[derive(Debug)]
pub struct SystemMatrix {
    /// System matrix G (row-major)
    pub a: Vec<f64>,
    /// Source vector I
    pub z: Vec<f64>,
    /// Solution vector V
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of G (for efficient solving)
    lu: Vec<f64>,
    /// Pivot indices for LU decomposition
    pivots: Vec<usize>,
}

impl SystemMatrix {
    /// Create a system for `size` non-ground nodes.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            z: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Clear the matrix and source vector to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add to source vector element.
    pub fn add_source(&mut self, row: usize, value: f64) {
        self.z[row] += value;
    }

    /// Sum a link's local admittance block and source vector into the
    /// system, skipping ground ports.
    pub fn stamp_link(&mut self, ports: &[NodeId; 2], admittance: &[f64; 4], source: &[f64; 2]) {
        for (i, pi) in ports.iter().enumerate() {
            if pi.is_ground() {
                continue;
            }
            let row = pi.0 - 1;
            self.add_source(row, source[i]);
            for (j, pj) in ports.iter().enumerate() {
                if pj.is_ground() {
                    continue;
                }
                self.add(row, pj.0 - 1, admittance[i * 2 + j]);
            }
        }
    }

    /// Perform LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for i in 0..n {
            self.pivots[i] = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_val < 1e-15 {
                return Err(crate::error::VoltaicError::SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve the system using the pre-computed LU decomposition.
    pub fn solve(&mut self) -> Result<()> {
        let n = self.size;

        // Apply pivot permutation to z
        let b = self.z.clone();
        for i in 0..n {
            self.x[i] = b[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            let diag = self.lu[i * n + i];
            if diag.abs() < 1e-15 {
                return Err(crate::error::VoltaicError::SingularMatrix);
            }
            self.x[i] /= diag;
        }

        Ok(())
    }

    /// Get the solved potential for a node (zero for ground).
    pub fn potential(&self, node: NodeId) -> f64 {
        if node.is_ground() {
            0.0
        } else {
            self.x[node.0 - 1]
        }
    }
}
