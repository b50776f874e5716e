//! Credential change observers

use std::sync::Arc;

/// Receives the raw credential every time it changes
///
/// Called synchronously, in subscription order, after the store has
/// finished updating. `None` means signed out.
pub trait Subscriber: Send + Sync {
    fn notify(&self, credential: Option<&str>);
}

impl<F> Subscriber for F
where
    F: Fn(Option<&str>) + Send + Sync,
{
    fn notify(&self, credential: Option<&str>) {
        self(credential);
    }
}

/// Identity comparison on the allocation, ignoring vtable metadata
pub(crate) fn same_subscriber(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
