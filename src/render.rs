//! Mounting, destroying and patching virtual trees against a [`Surface`].

use crate::{
	component::{Component, WeakComponent},
	scheduler::Scheduler,
	sequence::{diff_entries, diff_lists, diff_sequence, DiffOp},
	surface::{place, Listener, NodeId, Surface},
	vnode::{flatten, flatten_mut, nodes_equal, ComponentNode, ElementNode, Handler, Props, VNode},
	Error,
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::Rc;
use tracing::{instrument, trace, trace_span};

/// Text and attribute values may contain personal information, so they are only logged with the `dangerous-logging` feature.
fn redact(value: &str) -> &str {
	if cfg!(feature = "dangerous-logging") {
		value
	} else {
		"[redacted]"
	}
}

/// The component whose render produced the nodes being patched.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Owner<'a> {
	pub component: &'a Component,
	/// Where the component's nodes live.
	pub host: NodeId,
	/// Index of the component's first node within `host`, if its root is a fragment.
	pub offset: usize,
}

/// Binds virtual trees to a [`Surface`] and keeps them in sync.
///
/// Component lifecycle hooks are queued on the [`Scheduler`].
/// Clones share both.
#[derive(Clone)]
pub struct Renderer {
	surface: Rc<dyn Surface>,
	scheduler: Scheduler,
}

impl Debug for Renderer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Renderer").field("scheduler", &self.scheduler).finish_non_exhaustive()
	}
}

impl Renderer {
	#[must_use]
	pub fn new(surface: Rc<dyn Surface>, scheduler: Scheduler) -> Self {
		Self { surface, scheduler }
	}

	#[must_use]
	pub fn surface(&self) -> &Rc<dyn Surface> {
		&self.surface
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	/// Mounts `node` into `parent` at `index` (appending if [`None`] or past the end).
	///
	/// Returns the number of surface nodes inserted directly into `parent`.
	///
	/// # Errors
	///
	/// - [`Error::NegativeIndex`] iff `index` is negative.
	/// - [`Error::UnsupportedNode`] iff `node` is or contains a bare slot.
	/// - Any error produced while instantiating a component.
	#[instrument(skip(self, node), fields(kind = node.kind()))]
	pub fn mount(&self, node: &mut VNode, parent: NodeId, index: Option<isize>) -> Result<usize, Error> {
		let index = match index {
			Some(index) if index < 0 => return Err(Error::NegativeIndex(index)),
			#[allow(clippy::cast_sign_loss)]
			index => index.map(|index| index as usize),
		};
		self.mount_node(node, parent, index, None)
	}

	/// Removes the surface nodes bound to `node` and clears its live bindings.
	///
	/// # Errors
	///
	/// - [`Error::Unbound`] iff `node` isn't mounted.
	/// - [`Error::UnsupportedNode`] iff `node` is or contains a bare slot.
	#[instrument(skip(self, node), fields(kind = node.kind()))]
	pub fn destroy(&self, node: &mut VNode) -> Result<(), Error> {
		self.destroy_node(node)
	}

	/// Transforms the live tree bound to `old` (which was mounted into `parent`) so that it matches `new`,
	/// then binds `new` to it.
	///
	/// # Errors
	///
	/// Whatever mounting or destroying replaced nodes produces.
	#[instrument(skip(self, old, new), fields(old = old.kind(), new = new.kind()))]
	pub fn patch(&self, old: VNode, new: &mut VNode, parent: NodeId) -> Result<(), Error> {
		self.patch_node(old, new, parent, None)
	}

	pub(crate) fn mount_node(&self, node: &mut VNode, parent: NodeId, index: Option<usize>, owner: Option<&Component>) -> Result<usize, Error> {
		match node {
			VNode::Text(text) => {
				let span = trace_span!("Mounting text", value = redact(&text.value), ?index);
				let _enter = span.enter();

				let el = self.surface.create_text(&text.value);
				place(&*self.surface, el, parent, index);
				text.el = Some(el);
				Ok(1)
			}

			VNode::Element(element) => {
				let span = trace_span!("Mounting element", tag = %element.tag, ?index);
				let _enter = span.enter();

				let el = self.surface.create_element(&element.tag);
				self.apply_props(el, element, owner);
				element.el = Some(el);
				for child in &mut element.children {
					self.mount_node(child, el, None, owner)?;
				}
				place(&*self.surface, el, parent, index);
				Ok(1)
			}

			VNode::Fragment(fragment) => {
				let span = trace_span!("Mounting fragment", ?index);
				let _enter = span.enter();

				fragment.el = Some(parent);
				let mut count = 0;
				for child in &mut fragment.children {
					count += self.mount_node(child, parent, index.map(|index| index + count), owner)?;
				}
				Ok(count)
			}

			VNode::Component(node) => self.mount_component(node, parent, index, owner),

			VNode::Slot(_) => Err(Error::UnsupportedNode("slot")),
		}
	}

	fn mount_component(&self, node: &mut ComponentNode, parent: NodeId, index: Option<usize>, owner: Option<&Component>) -> Result<usize, Error> {
		let span = trace_span!("Mounting component", name = node.component_type.name(), ?index);
		let _enter = span.enter();

		let instance = Component::new(&node.component_type, node.props.attrs.clone(), node.props.on.clone(), owner, self.clone())?;
		instance.set_external_content(node.children.iter().map(VNode::template).collect());
		let count = instance.mount(parent, index)?;

		node.el = instance.first_element();
		node.instance = Some(instance.clone());
		self.scheduler.enqueue(move || instance.on_mounted());
		Ok(count)
	}

	pub(crate) fn destroy_node(&self, node: &mut VNode) -> Result<(), Error> {
		match node {
			VNode::Text(text) => {
				let span = trace_span!("Destroying text", value = redact(&text.value));
				let _enter = span.enter();

				let el = text.el.take().ok_or(Error::Unbound("text"))?;
				self.surface.remove(el);
				Ok(())
			}

			VNode::Element(element) => {
				let span = trace_span!("Destroying element", tag = %element.tag);
				let _enter = span.enter();

				let el = element.el.ok_or(Error::Unbound("element"))?;
				for child in &mut element.children {
					self.destroy_node(child)?;
				}
				for (event, listener) in element.listeners.drain() {
					self.surface.remove_event_listener(el, &event, &listener);
				}
				self.surface.remove(el);
				element.el = None;
				Ok(())
			}

			VNode::Fragment(fragment) => {
				let span = trace_span!("Destroying fragment");
				let _enter = span.enter();

				for child in &mut fragment.children {
					self.destroy_node(child)?;
				}
				fragment.el = None;
				Ok(())
			}

			VNode::Component(node) => {
				let span = trace_span!("Destroying component", name = node.component_type.name());
				let _enter = span.enter();

				let instance = node.instance.take().ok_or(Error::Unbound("component"))?;
				node.el = None;
				instance.unmount()?;
				self.scheduler.enqueue(move || instance.on_unmounted());
				Ok(())
			}

			VNode::Slot(_) => Err(Error::UnsupportedNode("slot")),
		}
	}

	pub(crate) fn patch_node(&self, mut old: VNode, new: &mut VNode, parent: NodeId, owner: Option<Owner<'_>>) -> Result<(), Error> {
		if !nodes_equal(&old, new) {
			let span = trace_span!("Replacing node", old = old.kind(), new = new.kind());
			let _enter = span.enter();

			let index = old.first_surface_node().and_then(|el| self.surface.index_of(parent, el));
			self.destroy_node(&mut old)?;
			self.mount_node(new, parent, index, owner.map(|owner| owner.component))?;
			return Ok(());
		}

		match (old, new) {
			(VNode::Text(old), VNode::Text(new)) => {
				let el = old.el.ok_or(Error::Unbound("text"))?;
				if old.value != new.value {
					trace!(old = redact(&old.value), new = redact(&new.value), "Updating text.");
					self.surface.set_text(el, &new.value);
				}
				new.el = Some(el);
				Ok(())
			}

			(VNode::Element(old), VNode::Element(new)) => {
				let span = trace_span!("Patching element", tag = %new.tag);
				let _enter = span.enter();

				let ElementNode { props, children, el, listeners, .. } = old;
				let el = el.ok_or(Error::Unbound("element"))?;
				new.el = Some(el);
				self.patch_props(el, &props, listeners, new, owner.map(|owner| owner.component));
				self.patch_children(children, &mut new.children, el, owner)
			}

			(VNode::Fragment(old), VNode::Fragment(new)) => {
				let el = old.el.ok_or(Error::Unbound("fragment"))?;
				new.el = Some(el);
				self.patch_children(old.children, &mut new.children, el, owner)
			}

			(VNode::Component(old), VNode::Component(new)) => {
				let span = trace_span!("Patching component", name = new.component_type.name());
				let _enter = span.enter();

				let instance = old.instance.ok_or(Error::Unbound("component"))?;
				instance.receive(new.props.attrs.clone(), Some(new.children.iter().map(VNode::template).collect()))?;
				new.el = instance.first_element();
				new.instance = Some(instance);
				Ok(())
			}

			(old, _) => Err(Error::UnsupportedNode(old.kind())),
		}
	}

	/// Reconciles the children of a node bound to `parent`.
	///
	/// Fragments are transparent here: Their children are spliced into the list they appear in.
	fn patch_children(&self, old: Vec<VNode>, new: &mut Vec<VNode>, parent: NodeId, owner: Option<Owner<'_>>) -> Result<(), Error> {
		let mut old_flat = Vec::with_capacity(old.len());
		flatten(old, &mut old_flat);
		let mut new_flat = Vec::with_capacity(new.len());
		flatten_mut(new, &mut new_flat);

		let script: Vec<DiffOp<()>> = {
			let old_refs: Vec<&VNode> = old_flat.iter().collect();
			let new_refs: Vec<&VNode> = new_flat.iter().map(|node| &**node).collect();
			diff_sequence(&old_refs, &new_refs, |a, b| nodes_equal(a, b)).into_iter().map(|op| op.map(|_| ())).collect()
		};

		// Indices in `script` count virtual children, which a fragment-rooted component shifts within its host.
		let offset = owner.filter(|owner| owner.host == parent).map_or(0, |owner| owner.offset);
		let mut old: Vec<Option<VNode>> = old_flat.into_iter().map(Some).collect();

		for op in script {
			match op {
				DiffOp::Add { index, .. } => {
					trace!(index, offset, "Adding child.");
					self.mount_node(&mut *new_flat[index], parent, Some(index + offset), owner.map(|owner| owner.component))?;
				}

				DiffOp::Remove { index, original_index, .. } => {
					trace!(index, ?original_index, "Removing child.");
					self.destroy_node(&mut take_child(&mut old, original_index)?)?;
				}

				DiffOp::Move { from, index, original_index, .. } => {
					trace!(from, index, offset, "Moving child.");
					let child = take_child(&mut old, original_index)?;

					let mut nodes = vec![];
					child.collect_surface_nodes(&mut nodes);
					let position = index + offset;
					if nodes.first().map_or(false, |first| self.surface.index_of(parent, *first) != Some(position)) {
						for (i, node) in nodes.into_iter().enumerate() {
							self.surface.insert_at(parent, node, position + i);
						}
					}
					self.patch_node(child, &mut *new_flat[index], parent, owner)?;
				}

				DiffOp::Noop { index, original_index, .. } => {
					let child = take_child(&mut old, original_index)?;
					self.patch_node(child, &mut *new_flat[index], parent, owner)?;
				}
			}
		}
		Ok(())
	}

	/// Sets attributes, classes and styles and binds listeners on a freshly created element.
	fn apply_props(&self, el: NodeId, element: &mut ElementNode, owner: Option<&Component>) {
		let props = &element.props;
		for (name, value) in &props.attrs {
			self.set_attribute(el, name, value);
		}
		for class in props.class.as_ref().map(|class| class.to_list()).unwrap_or_default() {
			self.surface.add_class(el, &class);
		}
		for (property, value) in &props.style {
			self.surface.set_style(el, property, value);
		}

		let mut listeners = HashMap::with_capacity(props.on.len());
		for (event, handler) in &props.on {
			listeners.insert(event.clone(), self.bind_listener(el, event, handler, owner));
		}
		element.listeners = listeners;
	}

	fn patch_props(&self, el: NodeId, old: &Props, mut listeners: HashMap<String, Listener>, new: &mut ElementNode, owner: Option<&Component>) {
		let props = &new.props;

		let attrs = diff_entries(&old.attrs, &props.attrs, |a, b| a == b);
		for name in attrs.removed {
			self.surface.remove_attribute(el, name);
		}
		for name in attrs.added.into_iter().chain(attrs.updated) {
			self.set_attribute(el, name, &props.attrs[name]);
		}

		let old_classes = old.class.as_ref().map(|class| class.to_list()).unwrap_or_default();
		let new_classes = props.class.as_ref().map(|class| class.to_list()).unwrap_or_default();
		let (added, removed) = diff_lists(&old_classes, &new_classes);
		for class in removed {
			self.surface.remove_class(el, class);
		}
		for class in added {
			self.surface.add_class(el, class);
		}

		let style = diff_entries(&old.style, &props.style, |a, b| a == b);
		for property in style.removed {
			self.surface.remove_style(el, property);
		}
		for property in style.added.into_iter().chain(style.updated) {
			self.surface.set_style(el, property, &props.style[property]);
		}

		let events = diff_entries(&old.on, &props.on, Handler::ptr_eq);
		for event in events.removed.iter().chain(&events.updated) {
			if let Some(listener) = listeners.remove(*event) {
				self.surface.remove_event_listener(el, event, &listener);
			}
		}
		for event in events.added.into_iter().chain(events.updated) {
			let listener = self.bind_listener(el, event, &props.on[event], owner);
			listeners.insert(event.clone(), listener);
		}
		new.listeners = listeners;
	}

	fn bind_listener(&self, el: NodeId, event: &str, handler: &Handler, owner: Option<&Component>) -> Listener {
		let handler = handler.clone();
		let owner = owner.map(Component::downgrade);
		let listener = Listener::new(move |payload| {
			let owner = owner.as_ref().and_then(WeakComponent::upgrade);
			handler.call(payload, owner.as_ref())
		});
		self.surface.add_event_listener(el, event, &listener);
		listener
	}

	/// `null` and `false` remove the attribute, `true` sets it empty. Non-string values are written as JSON.
	fn set_attribute(&self, el: NodeId, name: &str, value: &Value) {
		match value {
			Value::Null | Value::Bool(false) => self.surface.remove_attribute(el, name),
			Value::Bool(true) => self.surface.set_attribute(el, name, ""),
			Value::String(value) => {
				trace!(name, value = redact(value), "Setting attribute.");
				self.surface.set_attribute(el, name, value)
			}
			other => self.surface.set_attribute(el, name, &other.to_string()),
		}
	}
}

fn take_child(old: &mut [Option<VNode>], original_index: Option<usize>) -> Result<VNode, Error> {
	match original_index {
		Some(index) => old.get_mut(index).and_then(Option::take).ok_or(Error::Unbound("child")),
		None => Err(Error::Unbound("child")),
	}
}
