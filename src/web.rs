//! A [`Surface`] backed by the browser DOM.
//!
//! Everything here compiles on all targets, but only does something useful in a browser.

use crate::{
	scheduler::Scheduler,
	surface::{Listener, NodeId, Surface},
};
use core::{
	cell::{Cell, RefCell},
	convert::TryInto,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use js_sys::{Function, Reflect};
use serde_json::{Map, Value};
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

const NODE_ID_PROPERTY: &str = "__twigNodeId";

type ListenerKey = (NodeId, String, usize);

/// Maps [`NodeId`]s to [`web_sys::Node`]s of one [`web_sys::Document`].
///
/// Each attached [`Listener`] is kept alive by a [`Closure`] owned by this surface.
/// Dropping the surface makes those listeners throw into JavaScript when their event fires.
///
/// DOM exceptions are logged and otherwise ignored.
pub struct DomSurface {
	document: web_sys::Document,
	nodes: RefCell<HashMap<NodeId, web_sys::Node>>,
	closures: RefCell<HashMap<ListenerKey, Closure<dyn Fn(web_sys::Event)>>>,
	next_id: Cell<u64>,
}

impl Debug for DomSurface {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomSurface")
			.field("nodes", &self.nodes.borrow().len())
			.field("listeners", &self.closures.borrow().len())
			.finish_non_exhaustive()
	}
}

impl DomSurface {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self {
			document,
			nodes: RefCell::default(),
			closures: RefCell::default(),
			next_id: Cell::new(0),
		}
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}

	/// Registers an existing DOM node (like `<body>`), so that it can be used as host.
	///
	/// Adopting the same node twice returns the same [`NodeId`].
	pub fn adopt(&self, node: &web_sys::Node) -> NodeId {
		if let Some(id) = self.lookup(node) {
			return id;
		}

		let id = NodeId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		#[allow(clippy::cast_precision_loss)]
		let tag = JsValue::from_f64(id.0 as f64);
		if let Err(error) = Reflect::set(node, &JsValue::from_str(NODE_ID_PROPERTY), &tag) {
			error!("Failed to tag node {:?}: {:?}", id, error);
		}
		self.nodes.borrow_mut().insert(id, node.clone());
		trace!("Adopted {:?}.", id);
		id
	}

	fn lookup(&self, node: &web_sys::Node) -> Option<NodeId> {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let id = NodeId(Reflect::get(node, &JsValue::from_str(NODE_ID_PROPERTY)).ok()?.as_f64()? as u64);
		match self.nodes.borrow().get(&id) {
			Some(known) if known.is_same_node(Some(node)) => Some(id),
			_ => None,
		}
	}

	/// The DOM node behind `id`, if it is still registered.
	#[must_use]
	pub fn node(&self, id: NodeId) -> Option<web_sys::Node> {
		let node = self.nodes.borrow().get(&id).cloned();
		if node.is_none() {
			error!("Unknown node {:?}.", id);
		}
		node
	}

	fn element(&self, id: NodeId) -> Option<web_sys::Element> {
		match self.node(id)?.dyn_into::<web_sys::Element>() {
			Ok(element) => Some(element),
			Err(node) => {
				error!("Expected element but found {:?}.", node);
				None
			}
		}
	}

	fn html_element(&self, id: NodeId) -> Option<web_sys::HtmlElement> {
		match self.node(id)?.dyn_into::<web_sys::HtmlElement>() {
			Ok(element) => Some(element),
			Err(node) => {
				warn!("Expected HTML element (for styling) but found {:?}.", node);
				None
			}
		}
	}
}

/// Converts a DOM event into the payload passed to [`Listener`]s: `{"type": …}`, plus `value` and `checked` for `<input>` targets.
fn event_payload(event: &web_sys::Event) -> Value {
	let mut payload = Map::new();
	payload.insert("type".to_owned(), Value::String(event.type_()));
	if let Some(input) = event.target().and_then(|target| target.dyn_into::<web_sys::HtmlInputElement>().ok()) {
		payload.insert("value".to_owned(), Value::String(input.value()));
		payload.insert("checked".to_owned(), Value::Bool(input.checked()));
	}
	Value::Object(payload)
}

impl Surface for DomSurface {
	fn create_element(&self, tag: &str) -> NodeId {
		let span = trace_span!("Creating element", tag);
		let _enter = span.enter();

		let node: web_sys::Node = match self.document.create_element(tag) {
			Ok(element) => element.into(),
			Err(error) => {
				error!("Failed to create element <{}>: {:?}. Using a comment as placeholder.", tag, error);
				self.document.create_comment(tag).into()
			}
		};
		self.adopt(&node)
	}

	fn create_text(&self, value: &str) -> NodeId {
		let node: web_sys::Node = self.document.create_text_node(value).into();
		self.adopt(&node)
	}

	fn set_text(&self, node: NodeId, value: &str) {
		if let Some(node) = self.node(node) {
			node.set_text_content(Some(value))
		}
	}

	fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
		let (parent, child) = match (self.node(parent), self.node(child)) {
			(Some(parent), Some(child)) => (parent, child),
			_ => return,
		};
		let reference = reference.and_then(|reference| self.node(reference));
		if let Err(error) = parent.insert_before(&child, reference.as_ref()) {
			error!("Failed to insert node: {:?}", error);
		}
	}

	fn insert_at(&self, parent: NodeId, child: NodeId, index: usize) {
		let (parent, child) = match (self.node(parent), self.node(child)) {
			(Some(parent), Some(child)) => (parent, child),
			_ => return,
		};
		let reference = index.try_into().ok().and_then(|index: u32| parent.child_nodes().item(index));
		if let Err(error) = parent.insert_before(&child, reference.as_ref()) {
			error!("Failed to insert node: {:?}", error);
		}
	}

	fn remove(&self, node: NodeId) {
		let dom_node = match self.nodes.borrow_mut().remove(&node) {
			Some(dom_node) => dom_node,
			None => return error!("Unknown node {:?}.", node),
		};
		self.closures.borrow_mut().retain(|(owner, _, _), _| *owner != node);

		match dom_node.parent_node() {
			Some(parent) => {
				if let Err(error) = parent.remove_child(&dom_node) {
					error!("Failed to remove the node: {:?}", error)
				}
			}
			None => trace!("Removed node {:?} was already detached.", node),
		}
	}

	fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.set_attribute(name, value) {
				error!("Could not set attribute {:?}: {:?}", name, error)
			}
		}
	}

	fn remove_attribute(&self, node: NodeId, name: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.remove_attribute(name) {
				warn!("Could not remove attribute {:?}: {:?}", name, error)
			}
		}
	}

	fn add_class(&self, node: NodeId, class: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.class_list().add_1(class) {
				error!("Could not add class {:?}: {:?}", class, error)
			}
		}
	}

	fn remove_class(&self, node: NodeId, class: &str) {
		if let Some(element) = self.element(node) {
			if let Err(error) = element.class_list().remove_1(class) {
				warn!("Could not remove class {:?}: {:?}", class, error)
			}
		}
	}

	fn set_style(&self, node: NodeId, property: &str, value: &str) {
		if let Some(element) = self.html_element(node) {
			if let Err(error) = element.style().set_property(property, value) {
				error!("Could not set style {:?}: {:?}", property, error)
			}
		}
	}

	fn remove_style(&self, node: NodeId, property: &str) {
		if let Some(element) = self.html_element(node) {
			if let Err(error) = element.style().remove_property(property) {
				warn!("Could not remove style {:?}: {:?}", property, error)
			}
		}
	}

	fn add_event_listener(&self, node: NodeId, event: &str, listener: &Listener) {
		let key = (node, event.to_owned(), listener.address());
		if self.closures.borrow().contains_key(&key) {
			return trace!("Listener for {:?} is already attached.", event);
		}
		let target = match self.node(node) {
			Some(target) => target,
			None => return,
		};

		let listener = listener.clone();
		let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
			let span = trace_span!("Handling event", event = %event.type_());
			let _enter = span.enter();
			listener.call(&event_payload(&event))
		}) as Box<dyn Fn(web_sys::Event)>);

		if let Err(error) = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
			return error!("Failed to add event listener for {:?}: {:?}", event, error);
		}
		self.closures.borrow_mut().insert(key, closure);
	}

	fn remove_event_listener(&self, node: NodeId, event: &str, listener: &Listener) {
		let closure = match self.closures.borrow_mut().remove(&(node, event.to_owned(), listener.address())) {
			Some(closure) => closure,
			None => return warn!("No listener for {:?} to remove.", event),
		};
		if let Some(target) = self.node(node) {
			if let Err(error) = target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
				error!("Failed to remove event listener for {:?}: {:?}", event, error)
			}
		}
	}

	fn child_count(&self, parent: NodeId) -> usize {
		self.node(parent).map_or(0, |parent| parent.child_nodes().length() as usize)
	}

	/// Adopts the child if it wasn't known yet. Foreign nodes adopted this way stay registered.
	fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
		let index: u32 = index.try_into().ok()?;
		let child = self.node(parent)?.child_nodes().item(index)?;
		Some(self.adopt(&child))
	}

	fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
		let child = self.node(child)?;
		let child_nodes = self.node(parent)?.child_nodes();
		(0..child_nodes.length()).find(|i| child_nodes.item(*i).map_or(false, |sibling| sibling.is_same_node(Some(&child)))).map(|i| i as usize)
	}
}

/// A [`Scheduler`] that drains itself in a microtask whenever work is queued, like `queueMicrotask` batching.
#[must_use]
pub fn microtask_scheduler() -> Scheduler {
	Scheduler::with_wake(|scheduler| {
		let scheduler = scheduler.downgrade();
		let callback = Closure::once_into_js(move || {
			if let Some(scheduler) = scheduler.upgrade() {
				scheduler.drain();
			}
		});

		let queue_microtask = match Reflect::get(&js_sys::global(), &JsValue::from_str("queueMicrotask")).map(|queue_microtask| queue_microtask.dyn_into::<Function>()) {
			Ok(Ok(queue_microtask)) => queue_microtask,
			_ => return error!("`queueMicrotask` is unavailable. Call `Scheduler::settle` manually."),
		};
		if let Err(error) = queue_microtask.call1(&JsValue::UNDEFINED, &callback) {
			error!("Failed to queue microtask: {:?}", error)
		}
	})
}
