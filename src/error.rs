use thiserror::Error;

/// Usage errors.
///
/// These are returned synchronously from the operation that was misused.
/// Failures of scheduled lifecycle callbacks are *not* reported through this type;
/// they are logged by the [`Scheduler`](`crate::scheduler::Scheduler`) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	#[error("App is already mounted")]
	AppAlreadyMounted,
	#[error("App is not mounted")]
	AppNotMounted,
	#[error("Component is already mounted")]
	ComponentAlreadyMounted,
	#[error("Component is not mounted")]
	ComponentNotMounted,
	/// Unmounting is terminal. Instantiate the component again instead.
	#[error("Component was unmounted and can't be mounted again")]
	ComponentRetired,
	#[error("Index must be a positive integer, got {0}")]
	NegativeIndex(isize),
	#[error("Can't mount or destroy a node of kind {0}")]
	UnsupportedNode(&'static str),
	#[error("Method {0:?} is already defined on Component")]
	ReservedMethod(String),
	#[error("Method {0:?} is defined more than once")]
	DuplicateMethod(String),
	#[error("No method named {0:?}")]
	UnknownMethod(String),
	#[error("Expected a JSON object")]
	NotAnObject,
	/// A node that should have been mounted has no live binding.
	#[error("{0} node has no live binding")]
	Unbound(&'static str),
}
