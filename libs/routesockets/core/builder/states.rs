/// Type-state markers for the builder pattern
///
/// These types track which required fields have been set in the
/// builders at compile-time, so `build()` only exists once they are.

use std::marker::PhantomData;

/// Marker trait for the server port state
pub trait PortState {}

/// Port has not been set
pub struct NoPort;
impl PortState for NoPort {}

/// Port has been set
pub struct HasPort;
impl PortState for HasPort {}

/// Marker trait for the client URI state
pub trait UriState {}

/// URI has not been set
pub struct NoUri;
impl UriState for NoUri {}

/// URI has been set
pub struct HasUri;
impl UriState for HasUri {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<S> {
    _state: PhantomData<S>,
}

impl<S> TypeState<S> {
    pub(crate) fn new() -> Self {
        Self {
            _state: PhantomData,
        }
    }
}

impl<S> Default for TypeState<S> {
    fn default() -> Self {
        Self::new()
    }
}
