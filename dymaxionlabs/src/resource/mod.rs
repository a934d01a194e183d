//! Resource types manipulated by the Dymaxion Labs API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// We re-export everything from our support submodules.
pub use self::id::*;
pub use self::state::*;

// We only re-export the main names from our resource submodules.  For any
// other types, use a fully-qualified name.
pub use self::estimator::{Estimator, EstimatorType};
pub use self::file::File;
pub use self::task::Task;

/// Fields sent by the server which we don't model explicitly.
pub type Extra = BTreeMap<String, Value>;

/// A shared interface to the Dymaxion Labs resource types which live at a
/// REST collection of their own.
pub trait Resource: fmt::Debug + DeserializeOwned + Serialize + Sized + 'static {
    /// The collection path, starting with `/`, with no trailing slash.
    fn base_path() -> &'static str;

    /// The ID of this resource.
    fn id(&self) -> &Id<Self>;
}

/// A type which can be passed to `Client::create` to create a resource.
pub trait Args: fmt::Debug + Serialize {
    /// The type of resource created by these arguments.
    type Resource: Resource;
}

/// A type which can be sent as a partial update using `Client::update`.
///
/// `#[derive(Updatable)]` generates a `FooUpdate` struct with one optional
/// field for each `#[updatable]` field of `Foo`.
pub trait Updatable {
    /// The type of the data used to update this value.
    type Update: fmt::Debug + Serialize;
}

/// Declare that the listed types update by replacing the whole value.
macro_rules! primitive_updatable_types {
    ( $( $ty:ty ),* ) => {
        $(
            impl Updatable for $ty {
                type Update = Self;
            }
        )*
    };
}

primitive_updatable_types!(bool, f64, i64, u32, u64, String, Value);

impl<T: fmt::Debug + Serialize> Updatable for Vec<T> {
    type Update = Self;
}

impl<T: Updatable> Updatable for Option<T> {
    /// `Some(None)` clears the value on the server.
    type Update = Option<<T as Updatable>::Update>;
}

/// Many action endpoints wrap their result as `{"detail": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Detail<T> {
    pub(crate) detail: T,
}

// Support modules defining general types.
mod id;
mod state;

// Individual resource types.
pub mod estimator;
pub mod file;
pub mod task;

#[test]
fn option_update_can_clear_a_value() {
    let clear: Option<<Option<Value> as Updatable>::Update> = Some(None);
    assert_eq!(serde_json::to_string(&clear).unwrap(), "null");
}
