use super::parser::Gate;
use crate::engine::Complex;
use std::f64::consts::FRAC_1_SQRT_2;

pub const EPS: f64 = 1e-9;
/// Tolerance for comparing reduced density matrices.
const CORRELATION_EPS: f64 = 1e-6;

/// Dense state vector, basis index bit `i` is qubit `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    amplitudes: Vec<Complex>,
}

impl StateVector {
    pub fn new(num_qubits: usize) -> Self {
        let mut amplitudes = vec![Complex::ZERO; 1 << num_qubits];
        amplitudes[0] = Complex::ONE;
        Self { amplitudes }
    }

    pub fn amplitude(&self, index: usize) -> Option<Complex> {
        self.amplitudes.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn apply(&mut self, gate: Gate, targets: &[usize]) {
        let h = FRAC_1_SQRT_2;
        match gate {
            Gate::X => self.single(targets[0], [[0.0, 1.0], [1.0, 0.0]].map(real_row)),
            Gate::Y => self.single(
                targets[0],
                [
                    [Complex::ZERO, Complex::new(0.0, -1.0)],
                    [Complex::new(0.0, 1.0), Complex::ZERO],
                ],
            ),
            Gate::Z => self.phase(targets[0], Complex::new(-1.0, 0.0)),
            Gate::H => self.single(targets[0], [[h, h], [h, -h]].map(real_row)),
            Gate::S => self.phase(targets[0], Complex::new(0.0, 1.0)),
            Gate::Sdg => self.phase(targets[0], Complex::new(0.0, -1.0)),
            Gate::T => self.phase(targets[0], Complex::new(h, h)),
            Gate::Tdg => self.phase(targets[0], Complex::new(h, -h)),
            Gate::Cx => {
                let (c, t) = (1 << targets[0], 1 << targets[1]);
                for i in 0..self.len() {
                    if i & c != 0 && i & t == 0 {
                        self.amplitudes.swap(i, i | t);
                    }
                }
            }
            Gate::Cz => {
                let mask = (1 << targets[0]) | (1 << targets[1]);
                for i in 0..self.len() {
                    if i & mask == mask {
                        self.amplitudes[i] = self.amplitudes[i].scale(-1.0);
                    }
                }
            }
            Gate::Swap => {
                let (a, b) = (1 << targets[0], 1 << targets[1]);
                for i in 0..self.len() {
                    if i & a != 0 && i & b == 0 {
                        self.amplitudes.swap(i, i ^ a ^ b);
                    }
                }
            }
        }
    }

    fn single(&mut self, qubit: usize, m: [[Complex; 2]; 2]) {
        let bit = 1 << qubit;
        for i in 0..self.len() {
            if i & bit == 0 {
                let (x, y) = (self.amplitudes[i], self.amplitudes[i | bit]);
                self.amplitudes[i] = m[0][0] * x + m[0][1] * y;
                self.amplitudes[i | bit] = m[1][0] * x + m[1][1] * y;
            }
        }
    }

    fn phase(&mut self, qubit: usize, factor: Complex) {
        let bit = 1 << qubit;
        for i in 0..self.len() {
            if i & bit != 0 {
                self.amplitudes[i] = self.amplitudes[i] * factor;
            }
        }
    }

    /// Probability of reading `1` on `qubit`.
    pub fn probability_one(&self, qubit: usize) -> f64 {
        let bit = 1 << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & bit != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum()
    }

    /// Project `qubit` onto `outcome` and renormalize.
    pub fn collapse(&mut self, qubit: usize, outcome: bool) {
        let bit = 1 << qubit;
        let p_one = self.probability_one(qubit);
        let p = if outcome { p_one } else { 1.0 - p_one };
        let factor = if p > EPS { 1.0 / p.sqrt() } else { 0.0 };
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            if (i & bit != 0) == outcome {
                *a = a.scale(factor);
            } else {
                *a = Complex::ZERO;
            }
        }
    }

    /// Overwrite one amplitude and rescale the others so the state stays normalized.
    pub fn set_amplitude(&mut self, index: usize, value: Complex) -> crate::engine::Result<()> {
        let p = value.norm_sqr();
        if p > 1.0 + EPS {
            return Err(crate::engine::Error::AmplitudeTooLarge(p.sqrt()));
        }
        let rest: f64 = self
            .amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, a)| a.norm_sqr())
            .sum();
        let remaining = (1.0 - p).max(0.0);
        if rest < EPS && remaining > EPS {
            return Err(crate::engine::Error::NotNormalizable);
        }
        let factor = if rest < EPS {
            0.0
        } else {
            (remaining / rest).sqrt()
        };
        for (i, a) in self.amplitudes.iter_mut().enumerate() {
            *a = if i == index { value } else { a.scale(factor) };
        }
        Ok(())
    }

    /// True when measuring `qubits` can yield more than one outcome.
    pub fn is_superposition(&self, qubits: &[usize]) -> bool {
        let mask = qubits.iter().fold(0usize, |m, q| m | (1 << q));
        let mut outcome: Option<usize> = None;
        for (i, a) in self.amplitudes.iter().enumerate() {
            if a.norm_sqr() <= EPS {
                continue;
            }
            match outcome {
                None => outcome = Some(i & mask),
                Some(o) if o != i & mask => return true,
                Some(_) => {}
            }
        }
        false
    }

    /// True when the reduced state of `a` and `b` is not a product state.
    pub fn are_correlated(&self, a: usize, b: usize) -> bool {
        let (bit_a, bit_b) = (1 << a, 1 << b);
        let local = |i: usize| usize::from(i & bit_a != 0) | (usize::from(i & bit_b != 0) << 1);
        let global = |rest: usize, l: usize| {
            let a_part = if l & 1 != 0 { bit_a } else { 0 };
            let b_part = if l & 2 != 0 { bit_b } else { 0 };
            rest | a_part | b_part
        };

        let mut rho = [[Complex::ZERO; 4]; 4];
        for (i, amp) in self.amplitudes.iter().enumerate() {
            let rest = i & !(bit_a | bit_b);
            let li = local(i);
            for (lj, cell) in rho[li].iter_mut().enumerate() {
                *cell = *cell + *amp * self.amplitudes[global(rest, lj)].conj();
            }
        }

        let mut rho_a = [[Complex::ZERO; 2]; 2];
        let mut rho_b = [[Complex::ZERO; 2]; 2];
        for x in 0..2 {
            for y in 0..2 {
                for z in 0..2 {
                    rho_a[x][y] = rho_a[x][y] + rho[x | (z << 1)][y | (z << 1)];
                    rho_b[x][y] = rho_b[x][y] + rho[z | (x << 1)][z | (y << 1)];
                }
            }
        }

        (0..4).any(|li| {
            (0..4).any(|lj| {
                let product = rho_a[li & 1][lj & 1] * rho_b[li >> 1][lj >> 1];
                (rho[li][lj] - product).norm_sqr().sqrt() > CORRELATION_EPS
            })
        })
    }
}

fn real_row(row: [f64; 2]) -> [Complex; 2] {
    row.map(|v| Complex::new(v, 0.0))
}
