//! The host surface that virtual trees are mounted onto.

use crate::Error;
use core::fmt::{self, Debug, Formatter};
use serde_json::Value;
use std::rc::Rc;

/// Opaque handle to a live node on a [`Surface`].
///
/// A surface must keep a node's handle stable for as long as the node exists,
/// so that moved nodes remain recognisably the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// An event listener as attached to a surface node.
///
/// Listener identity is the identity of the shared closure, which is what [`Surface::remove_event_listener`] compares.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn(&Value)>);
impl Listener {
	pub fn new(f: impl 'static + Fn(&Value)) -> Self {
		Self(Rc::new(f))
	}

	pub fn call(&self, event: &Value) {
		(self.0)(event)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// A hashable stand-in for [`Listener::ptr_eq`].
	#[must_use]
	pub fn address(&self) -> usize {
		Rc::as_ptr(&self.0) as *const () as usize
	}
}
impl Debug for Listener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Listener").field(&format_args!("{:#x}", self.address())).finish()
	}
}

/// The capabilities the renderer needs from a host tree.
///
/// All methods take `&self`: Listeners may re-enter the surface while it is being mutated elsewhere up the stack,
/// so implementations use interior mutability and must not hold internal borrows while calling out.
///
/// Surfaces don't report errors. An implementation that can fail (like a browser DOM) logs the failure and carries on.
pub trait Surface {
	fn create_element(&self, tag: &str) -> NodeId;
	fn create_text(&self, value: &str) -> NodeId;
	fn set_text(&self, node: NodeId, value: &str);

	/// Inserts (or moves) `child` into `parent` before `reference`, or at the end if `reference` is [`None`].
	fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>);
	fn append(&self, parent: NodeId, child: NodeId) {
		self.insert_before(parent, child, None)
	}
	/// Inserts (or moves) `child` into `parent` before the child currently at `index`, or at the end if there is none.
	///
	/// Surfaces that can resolve the reference node themselves should override this,
	/// so that no handle has to be issued for it.
	fn insert_at(&self, parent: NodeId, child: NodeId, index: usize) {
		let reference = if index < self.child_count(parent) { self.child_at(parent, index) } else { None };
		self.insert_before(parent, child, reference)
	}
	/// Detaches `node` from its parent, if any.
	fn remove(&self, node: NodeId);

	fn set_attribute(&self, node: NodeId, name: &str, value: &str);
	fn remove_attribute(&self, node: NodeId, name: &str);
	fn add_class(&self, node: NodeId, class: &str);
	fn remove_class(&self, node: NodeId, class: &str);
	fn set_style(&self, node: NodeId, property: &str, value: &str);
	fn remove_style(&self, node: NodeId, property: &str);

	fn add_event_listener(&self, node: NodeId, event: &str, listener: &Listener);
	fn remove_event_listener(&self, node: NodeId, event: &str, listener: &Listener);

	fn child_count(&self, parent: NodeId) -> usize;
	fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId>;
	fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize>;
}

/// Inserts `node` into `parent` at `index`.
///
/// [`None`] or an index past the end appends. Otherwise `node` is inserted before the child currently at `index`.
///
/// # Errors
///
/// Iff `index` is negative.
pub fn insert(surface: &dyn Surface, node: NodeId, parent: NodeId, index: Option<isize>) -> Result<(), Error> {
	let index = match index {
		None => {
			surface.append(parent, node);
			return Ok(());
		}
		Some(index) if index < 0 => return Err(Error::NegativeIndex(index)),
		#[allow(clippy::cast_sign_loss)]
		Some(index) => index as usize,
	};
	place(surface, node, parent, Some(index));
	Ok(())
}

pub(crate) fn place(surface: &dyn Surface, node: NodeId, parent: NodeId, index: Option<usize>) {
	match index {
		Some(index) => surface.insert_at(parent, node, index),
		None => surface.append(parent, node),
	}
}
