use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use crate::errors::Result;
use crate::functions::{Callable, Kwargs, Signature};
use crate::value::Value;

/// Forwards calls to the inner callable after dropping keyword arguments
/// its signature does not declare. Positional arguments, return values and
/// errors pass through untouched.
pub struct DynamicArgs {
    inner: Arc<dyn Callable>,
}

impl DynamicArgs {
    pub fn new(inner: Arc<dyn Callable>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn Callable> {
        &self.inner
    }
}

impl Callable for DynamicArgs {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let signature = self.inner.signature();
        let (kept, dropped): (Kwargs, Kwargs) = kwargs
            .into_iter()
            .partition(|(name, _)| signature.accepts_keyword(name));
        if !dropped.is_empty() {
            debug!(
                function = self.inner.name(),
                dropped = %dropped.iter().map(|(name, _)| name).join(", "),
                "dropping undeclared keyword arguments"
            );
        }
        self.inner.call(args, kept)
    }
}

pub fn dynamic_args_wrapper(callable: Arc<dyn Callable>) -> Arc<dyn Callable> {
    Arc::new(DynamicArgs::new(callable))
}
