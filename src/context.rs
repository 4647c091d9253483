//! Process-wide state of the factorization library, passed explicitly.
//!
//! A [`CholeskyContext`] is created with [`CholeskyContext::start`] and torn down with
//! [`CholeskyContext::finish`]. Every matrix, vector and factor the driver holds is wrapped in an
//! [`Owned`] handle obtained from [`CholeskyContext::acquire`]. Dropping the handle is its only
//! release call. Handles borrow the context, so it cannot be finished while one is alive.
use std::cell::{Cell, RefCell};
use std::ops::{Deref, DerefMut};

use derive_more::{Display, Error};
use problemo::Problem;

use crate::config::Backend;
use crate::linalg::cholesky::{SimplicialSparseCholesky, SupernodalSparseCholesky};
use crate::linalg::solver::Solver;

#[derive(Debug, Display, Error, PartialEq)]
pub enum ContextError {
    #[display("{count} resources were still held at teardown")]
    LeakedResources { count: usize },
}

pub struct CholeskyContext {
    backend: Backend,
    live: Cell<usize>,
    acquired: Cell<usize>,
    released: RefCell<Vec<&'static str>>,
}

impl CholeskyContext {
    pub fn start(backend: Backend) -> Self {
        log::info!(
            "Starting {} v{} with {backend} Cholesky backend",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        Self {
            backend,
            live: Cell::new(0),
            acquired: Cell::new(0),
            released: RefCell::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Creates an unanalyzed solver for the configured backend.
    pub fn new_solver(&self) -> Box<dyn Solver> {
        match self.backend {
            Backend::Simplicial => Box::new(SimplicialSparseCholesky::new()),
            Backend::Supernodal => Box::new(SupernodalSparseCholesky::new()),
        }
    }

    /// Takes ownership of `value` as a tracked resource named `label`.
    pub fn acquire<T>(&self, label: &'static str, value: T) -> Owned<'_, T> {
        self.live.set(self.live.get() + 1);
        self.acquired.set(self.acquired.get() + 1);
        log::debug!("Acquired {label}");
        Owned {
            ctx: self,
            label,
            value,
        }
    }

    /// Number of handles currently alive.
    pub fn live(&self) -> usize {
        self.live.get()
    }

    /// Number of handles ever acquired.
    pub fn acquired(&self) -> usize {
        self.acquired.get()
    }

    /// Labels of released handles, in release order.
    pub fn released(&self) -> Vec<&'static str> {
        self.released.borrow().clone()
    }

    pub fn finish(self) -> Result<(), Problem> {
        let count = self.live.get();
        if count != 0 {
            return Err(ContextError::LeakedResources { count }.into());
        }
        log::info!("Context finished after {} resources", self.acquired.get());
        Ok(())
    }

    fn release(&self, label: &'static str) {
        self.live.set(self.live.get() - 1);
        self.released.borrow_mut().push(label);
        log::debug!("Released {label}");
    }
}

/// A resource owned through a [`CholeskyContext`].
pub struct Owned<'ctx, T> {
    ctx: &'ctx CholeskyContext,
    label: &'static str,
    value: T,
}

impl<T> Deref for Owned<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Owned<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Owned<'_, T> {
    fn drop(&mut self) {
        self.ctx.release(self.label);
    }
}
