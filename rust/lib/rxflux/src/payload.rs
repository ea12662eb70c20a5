use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A type-erased, reference-counted value.
///
/// Carries action payloads and the leaves of a [`Node`](crate::Node) tree.
/// Clone is an atomic increment; the value itself is never copied.
///
/// Two payloads are equal only when they share the same allocation. The
/// contents are never compared, which keeps state deduplication a pointer
/// check no matter what the leaf holds.
#[derive(Clone)]
pub struct Payload {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap `value` in a new allocation.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Payload for actions that carry nothing.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Returns `None` if the stored type isn't `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the stored value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Name of the stored type, as reported by `std::any::type_name`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when both payloads point at the same allocation.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        macro_rules! show {
            ($($ty:ty),*) => {
                $(
                    if let Some(v) = self.downcast_ref::<$ty>() {
                        return fmt::Debug::fmt(v, f);
                    }
                )*
            };
        }
        show!(bool, i32, i64, u32, u64, usize, f64, String, &'static str, ());
        write!(f, "<{}>", self.type_name)
    }
}
