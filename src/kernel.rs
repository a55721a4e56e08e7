// src/kernel.rs
//
// Declarative per-sample computations and their compiled form.
//
// A `FrameExpr` describes what happens to one sample. It can be evaluated
// sample by sample (`eval`), or lowered by a `KernelCompiler` into a
// `FrameKernel` that processes a whole buffer in one call.

use std::ops::{Add, Mul, Sub};

use crate::error::{CompileError, RenderError};

//
// ===============================
// MARK: Expression tree
// ===============================
//

/// Per-sample computation expressed as data.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameExpr {
    /// The rendered sample for this frame
    Input,

    /// Absolute frame index (as f32)
    Frame,

    Const(f32),

    Add(Box<FrameExpr>, Box<FrameExpr>),
    Sub(Box<FrameExpr>, Box<FrameExpr>),
    Mul(Box<FrameExpr>, Box<FrameExpr>),

    Tanh(Box<FrameExpr>),
    Sin(Box<FrameExpr>),

    Clamp {
        value: Box<FrameExpr>,
        min: f32,
        max: f32,
    },
}

impl FrameExpr {
    pub fn input() -> Self {
        FrameExpr::Input
    }

    pub fn frame() -> Self {
        FrameExpr::Frame
    }

    pub fn constant(value: f32) -> Self {
        FrameExpr::Const(value)
    }

    pub fn tanh(self) -> Self {
        FrameExpr::Tanh(Box::new(self))
    }

    pub fn sin(self) -> Self {
        FrameExpr::Sin(Box::new(self))
    }

    pub fn clamp(self, min: f32, max: f32) -> Self {
        FrameExpr::Clamp {
            value: Box::new(self),
            min,
            max,
        }
    }

    /// Evaluate for a single sample by walking the tree.
    pub fn eval(&self, input: f32, frame: u64) -> f32 {
        match self {
            FrameExpr::Input => input,
            FrameExpr::Frame => frame as f32,
            FrameExpr::Const(v) => *v,
            FrameExpr::Add(a, b) => a.eval(input, frame) + b.eval(input, frame),
            FrameExpr::Sub(a, b) => a.eval(input, frame) - b.eval(input, frame),
            FrameExpr::Mul(a, b) => a.eval(input, frame) * b.eval(input, frame),
            FrameExpr::Tanh(a) => a.eval(input, frame).tanh(),
            FrameExpr::Sin(a) => a.eval(input, frame).sin(),
            FrameExpr::Clamp { value, min, max } => value.eval(input, frame).clamp(*min, *max),
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            FrameExpr::Input | FrameExpr::Frame | FrameExpr::Const(_) => 1,
            FrameExpr::Add(a, b) | FrameExpr::Sub(a, b) | FrameExpr::Mul(a, b) => {
                1 + a.node_count() + b.node_count()
            }
            FrameExpr::Tanh(a) | FrameExpr::Sin(a) => 1 + a.node_count(),
            FrameExpr::Clamp { value, .. } => 1 + value.node_count(),
        }
    }
}

impl Add for FrameExpr {
    type Output = FrameExpr;

    fn add(self, rhs: FrameExpr) -> FrameExpr {
        FrameExpr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for FrameExpr {
    type Output = FrameExpr;

    fn sub(self, rhs: FrameExpr) -> FrameExpr {
        FrameExpr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for FrameExpr {
    type Output = FrameExpr;

    fn mul(self, rhs: FrameExpr) -> FrameExpr {
        FrameExpr::Mul(Box::new(self), Box::new(rhs))
    }
}

//
// ===============================
// MARK: Compiled-execution capability
// ===============================
//

/// A compiled per-sample computation.
pub trait FrameKernel {
    /// Run the computation `input.len()` times as one invocation.
    ///
    /// Frame `i` of the call is absolute frame `start_frame + i`.
    fn execute(&mut self, start_frame: u64, input: &[f32], output: &mut [f32]) -> Result<(), RenderError>;
}

/// Lowers a `FrameExpr` into a `FrameKernel`.
pub trait KernelCompiler {
    fn compile(&self, expr: &FrameExpr) -> Result<Box<dyn FrameKernel>, CompileError>;
}

/// Default backend: a register program executed one instruction at a time
/// across the whole buffer.
#[derive(Debug, Clone, Copy)]
pub struct BlockCompiler {
    max_registers: usize,
}

impl Default for BlockCompiler {
    fn default() -> Self {
        Self { max_registers: 64 }
    }
}

impl BlockCompiler {
    pub fn new(max_registers: usize) -> Self {
        Self { max_registers }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Instr {
    Input { dst: usize },
    Frame { dst: usize },
    Const { dst: usize, value: f32 },
    Add { dst: usize, a: usize, b: usize },
    Sub { dst: usize, a: usize, b: usize },
    Mul { dst: usize, a: usize, b: usize },
    Tanh { dst: usize, src: usize },
    Sin { dst: usize, src: usize },
    Clamp { dst: usize, src: usize, min: f32, max: f32 },
}

impl KernelCompiler for BlockCompiler {
    fn compile(&self, expr: &FrameExpr) -> Result<Box<dyn FrameKernel>, CompileError> {
        let needed = expr.node_count();
        if needed > self.max_registers {
            return Err(CompileError::TooManyRegisters {
                needed,
                limit: self.max_registers,
            });
        }

        let mut program = Vec::with_capacity(needed);
        let result = lower(expr, &mut program);

        Ok(Box::new(BlockKernel {
            program,
            registers: vec![Vec::new(); needed],
            result,
        }))
    }
}

/// Post-order lowering. Every node gets a fresh register, so operands
/// always live in lower-numbered registers than their destination.
fn lower(expr: &FrameExpr, program: &mut Vec<Instr>) -> usize {
    let instr = match expr {
        FrameExpr::Input => Instr::Input { dst: 0 },
        FrameExpr::Frame => Instr::Frame { dst: 0 },
        FrameExpr::Const(value) => Instr::Const { dst: 0, value: *value },
        FrameExpr::Add(a, b) => {
            let (a, b) = (lower(a, program), lower(b, program));
            Instr::Add { dst: 0, a, b }
        }
        FrameExpr::Sub(a, b) => {
            let (a, b) = (lower(a, program), lower(b, program));
            Instr::Sub { dst: 0, a, b }
        }
        FrameExpr::Mul(a, b) => {
            let (a, b) = (lower(a, program), lower(b, program));
            Instr::Mul { dst: 0, a, b }
        }
        FrameExpr::Tanh(a) => Instr::Tanh { dst: 0, src: lower(a, program) },
        FrameExpr::Sin(a) => Instr::Sin { dst: 0, src: lower(a, program) },
        FrameExpr::Clamp { value, min, max } => Instr::Clamp {
            dst: 0,
            src: lower(value, program),
            min: *min,
            max: *max,
        },
    };

    let dst = program.len();
    program.push(instr.with_dst(dst));
    dst
}

impl Instr {
    fn with_dst(self, dst: usize) -> Self {
        match self {
            Instr::Input { .. } => Instr::Input { dst },
            Instr::Frame { .. } => Instr::Frame { dst },
            Instr::Const { value, .. } => Instr::Const { dst, value },
            Instr::Add { a, b, .. } => Instr::Add { dst, a, b },
            Instr::Sub { a, b, .. } => Instr::Sub { dst, a, b },
            Instr::Mul { a, b, .. } => Instr::Mul { dst, a, b },
            Instr::Tanh { src, .. } => Instr::Tanh { dst, src },
            Instr::Sin { src, .. } => Instr::Sin { dst, src },
            Instr::Clamp { src, min, max, .. } => Instr::Clamp { dst, src, min, max },
        }
    }

    fn dst(&self) -> usize {
        match *self {
            Instr::Input { dst }
            | Instr::Frame { dst }
            | Instr::Const { dst, .. }
            | Instr::Add { dst, .. }
            | Instr::Sub { dst, .. }
            | Instr::Mul { dst, .. }
            | Instr::Tanh { dst, .. }
            | Instr::Sin { dst, .. }
            | Instr::Clamp { dst, .. } => dst,
        }
    }
}

struct BlockKernel {
    program: Vec<Instr>,
    /// One column per instruction, sized to the largest buffer seen
    registers: Vec<Vec<f32>>,
    result: usize,
}

impl FrameKernel for BlockKernel {
    fn execute(&mut self, start_frame: u64, input: &[f32], output: &mut [f32]) -> Result<(), RenderError> {
        let n = input.len();
        if output.len() < n {
            return Err(RenderError::Kernel(format!(
                "output holds {} frames, input holds {}",
                output.len(),
                n
            )));
        }

        for register in &mut self.registers {
            if register.len() < n {
                register.resize(n, 0.0);
            }
        }

        for instr in &self.program {
            let (lo, hi) = self.registers.split_at_mut(instr.dst());
            let dst = &mut hi[0][..n];

            match *instr {
                Instr::Input { .. } => dst.copy_from_slice(input),
                Instr::Frame { .. } => {
                    for (i, d) in dst.iter_mut().enumerate() {
                        *d = (start_frame + i as u64) as f32;
                    }
                }
                Instr::Const { value, .. } => dst.fill(value),
                Instr::Add { a, b, .. } => {
                    for ((d, x), y) in dst.iter_mut().zip(&lo[a][..n]).zip(&lo[b][..n]) {
                        *d = x + y;
                    }
                }
                Instr::Sub { a, b, .. } => {
                    for ((d, x), y) in dst.iter_mut().zip(&lo[a][..n]).zip(&lo[b][..n]) {
                        *d = x - y;
                    }
                }
                Instr::Mul { a, b, .. } => {
                    for ((d, x), y) in dst.iter_mut().zip(&lo[a][..n]).zip(&lo[b][..n]) {
                        *d = x * y;
                    }
                }
                Instr::Tanh { src, .. } => {
                    for (d, x) in dst.iter_mut().zip(&lo[src][..n]) {
                        *d = x.tanh();
                    }
                }
                Instr::Sin { src, .. } => {
                    for (d, x) in dst.iter_mut().zip(&lo[src][..n]) {
                        *d = x.sin();
                    }
                }
                Instr::Clamp { src, min, max, .. } => {
                    for (d, x) in dst.iter_mut().zip(&lo[src][..n]) {
                        *d = x.clamp(min, max);
                    }
                }
            }
        }

        output[..n].copy_from_slice(&self.registers[self.result][..n]);
        Ok(())
    }
}
