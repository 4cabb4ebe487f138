//! Listener types for the runtime.
//!
//! A listener is the computation behind a component. The graph hands it an
//! input snapshot and awaits an output object; how the work is done
//! (in-process, in a sandbox, across a process boundary) is up to the
//! implementation.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::ListenerError;
use crate::graph::{InputSnapshot, OutputObject};

/// Result of one listener invocation.
pub type ListenerResult = Result<OutputObject, ListenerError>;

/// The async computation of a component.
///
/// Any `Fn(InputSnapshot) -> impl Future<Output = ListenerResult>` closure is
/// a listener.
pub trait Listener: Send + Sync {
    fn call(&self, input: InputSnapshot) -> BoxFuture<'static, ListenerResult>;
}

impl<F, Fut> Listener for F
where
    F: Fn(InputSnapshot) -> Fut + Send + Sync,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    fn call(&self, input: InputSnapshot) -> BoxFuture<'static, ListenerResult> {
        (self)(input).boxed()
    }
}
