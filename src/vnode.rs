//! Virtual nodes: Descriptions of a desired tree, optionally bound to the live surface nodes they produced.

use crate::{
	component::{Component, ComponentType},
	surface::{Listener, NodeId},
};
use core::{
	fmt::{self, Debug, Formatter},
	mem,
};
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, rc::Rc};

/// An event handler supplied through [`Props::on`].
///
/// On elements, it receives the surface event and the component that rendered the element, if any.
/// On components, it receives the emitted payload and the component that rendered the component node, if any.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&Value, Option<&Component>)>);
impl Handler {
	pub fn new(f: impl 'static + Fn(&Value, Option<&Component>)) -> Self {
		Self(Rc::new(f))
	}

	pub fn call(&self, payload: &Value, owner: Option<&Component>) {
		(self.0)(payload, owner)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Debug for Handler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Handler").field(&Rc::as_ptr(&self.0)).finish()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Class {
	/// Whitespace-separated class names.
	Str(String),
	List(Vec<String>),
}
impl Class {
	/// Individual class names, without blanks.
	#[must_use]
	pub fn to_list(&self) -> Vec<String> {
		match self {
			Class::Str(classes) => classes.split_whitespace().map(str::to_owned).collect(),
			Class::List(classes) => classes.iter().map(|class| class.trim()).filter(|class| !class.is_empty()).map(str::to_owned).collect(),
		}
	}
}
impl From<&str> for Class {
	fn from(classes: &str) -> Self {
		Class::Str(classes.to_owned())
	}
}
impl From<String> for Class {
	fn from(classes: String) -> Self {
		Class::Str(classes)
	}
}
impl From<Vec<String>> for Class {
	fn from(classes: Vec<String>) -> Self {
		Class::List(classes)
	}
}
impl From<Vec<&str>> for Class {
	fn from(classes: Vec<&str>) -> Self {
		Class::List(classes.into_iter().map(str::to_owned).collect())
	}
}

/// Element and component properties.
///
/// The reserved entries (`key`, `class`, `style` and `on`) are split out.
/// For components, `attrs` become the instance's props and `on` its event handlers.
#[derive(Debug, Clone, Default)]
pub struct Props {
	/// Stable sibling identity.
	pub key: Option<Value>,
	pub class: Option<Class>,
	pub style: BTreeMap<String, String>,
	pub attrs: Map<String, Value>,
	pub on: BTreeMap<String, Handler>,
}
impl Props {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes every entry of a JSON object as attribute.
	/// Anything other than an object results in empty props.
	#[must_use]
	pub fn from_attrs(attrs: Value) -> Self {
		match attrs {
			Value::Object(attrs) => Self { attrs, ..Self::default() },
			_ => Self::default(),
		}
	}

	#[must_use]
	pub fn key(mut self, key: impl Into<Value>) -> Self {
		self.key = Some(key.into());
		self
	}

	#[must_use]
	pub fn class(mut self, class: impl Into<Class>) -> Self {
		self.class = Some(class.into());
		self
	}

	#[must_use]
	pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
		self.style.insert(property.into(), value.into());
		self
	}

	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attrs.insert(name.into(), value.into());
		self
	}

	#[must_use]
	pub fn on(mut self, event: impl Into<String>, handler: impl 'static + Fn(&Value, Option<&Component>)) -> Self {
		self.on.insert(event.into(), Handler::new(handler));
		self
	}

	/// Like [`Props::on`], but reuses an existing handler (and with that its identity).
	#[must_use]
	pub fn on_handler(mut self, event: impl Into<String>, handler: Handler) -> Self {
		self.on.insert(event.into(), handler);
		self
	}
}

#[derive(Debug)]
pub struct TextNode {
	pub value: String,
	pub(crate) el: Option<NodeId>,
}

#[derive(Debug)]
pub struct ElementNode {
	pub tag: String,
	pub props: Props,
	pub children: Vec<VNode>,
	pub(crate) el: Option<NodeId>,
	pub(crate) listeners: HashMap<String, Listener>,
}
impl ElementNode {
	/// The listeners currently attached to this element's live node, by event name.
	#[must_use]
	pub fn listeners(&self) -> &HashMap<String, Listener> {
		&self.listeners
	}
}

#[derive(Debug)]
pub struct FragmentNode {
	pub children: Vec<VNode>,
	/// The host the children were mounted into.
	pub(crate) el: Option<NodeId>,
}

#[derive(Debug)]
pub struct ComponentNode {
	pub component_type: ComponentType,
	pub props: Props,
	/// External content, filled into the component's slots.
	pub children: Vec<VNode>,
	pub(crate) el: Option<NodeId>,
	pub(crate) instance: Option<Component>,
}
impl ComponentNode {
	#[must_use]
	pub fn instance(&self) -> Option<&Component> {
		self.instance.as_ref()
	}
}

/// Placeholder for external content. Replaced while rendering, so never mounted itself.
#[derive(Debug)]
pub struct SlotNode {
	/// Default content, used when there is no external content.
	pub children: Vec<VNode>,
}

/// A virtual node.
///
/// Not [`Clone`]: A mounted node exclusively owns its live binding.
/// Use [`VNode::template`] to get an unbound copy.
#[derive(Debug)]
pub enum VNode {
	Text(TextNode),
	Element(ElementNode),
	Fragment(FragmentNode),
	Component(ComponentNode),
	Slot(SlotNode),
}

/// Anything that can appear in a child list. [`None`] and empty [`Option`]s are dropped.
pub trait IntoChild {
	fn into_child(self) -> Option<VNode>;
}
impl IntoChild for VNode {
	fn into_child(self) -> Option<VNode> {
		Some(self)
	}
}
impl IntoChild for &str {
	fn into_child(self) -> Option<VNode> {
		Some(text(self))
	}
}
impl IntoChild for String {
	fn into_child(self) -> Option<VNode> {
		Some(text(self))
	}
}
impl<T: IntoChild> IntoChild for Option<T> {
	fn into_child(self) -> Option<VNode> {
		self.and_then(IntoChild::into_child)
	}
}

fn collect_children(children: impl IntoIterator<Item = impl IntoChild>) -> Vec<VNode> {
	children.into_iter().filter_map(IntoChild::into_child).collect()
}

#[must_use]
pub fn text(value: impl Into<String>) -> VNode {
	VNode::Text(TextNode { value: value.into(), el: None })
}

pub fn element(tag: impl Into<String>, props: Props, children: impl IntoIterator<Item = impl IntoChild>) -> VNode {
	VNode::Element(ElementNode {
		tag: tag.into(),
		props,
		children: collect_children(children),
		el: None,
		listeners: HashMap::new(),
	})
}

pub fn fragment(children: impl IntoIterator<Item = impl IntoChild>) -> VNode {
	VNode::Fragment(FragmentNode {
		children: collect_children(children),
		el: None,
	})
}

pub fn slot(children: impl IntoIterator<Item = impl IntoChild>) -> VNode {
	VNode::Slot(SlotNode { children: collect_children(children) })
}

pub fn component(component_type: &ComponentType, props: Props, children: impl IntoIterator<Item = impl IntoChild>) -> VNode {
	VNode::Component(ComponentNode {
		component_type: component_type.clone(),
		props,
		children: collect_children(children),
		el: None,
		instance: None,
	})
}

/// An empty child list, for when the item type can't be inferred.
#[must_use]
pub fn no_children() -> Vec<VNode> {
	vec![]
}

/// Whether `a` and `b` describe the same node, so that one can be patched into the other.
///
/// Elements must share tag and key, components must share type and key.
/// Text, fragments and slots compare by kind only. Content is the patcher's business.
#[must_use]
pub fn nodes_equal(a: &VNode, b: &VNode) -> bool {
	match (a, b) {
		(VNode::Element(a), VNode::Element(b)) => a.tag == b.tag && a.props.key == b.props.key,
		(VNode::Component(a), VNode::Component(b)) => Rc::ptr_eq(&a.component_type, &b.component_type) && a.props.key == b.props.key,
		(VNode::Text(_), VNode::Text(_)) | (VNode::Fragment(_), VNode::Fragment(_)) | (VNode::Slot(_), VNode::Slot(_)) => true,
		_ => false,
	}
}

impl VNode {
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			VNode::Text(_) => "text",
			VNode::Element(_) => "element",
			VNode::Fragment(_) => "fragment",
			VNode::Component(_) => "component",
			VNode::Slot(_) => "slot",
		}
	}

	#[must_use]
	pub fn key(&self) -> Option<&Value> {
		match self {
			VNode::Element(ElementNode { props, .. }) | VNode::Component(ComponentNode { props, .. }) => props.key.as_ref(),
			VNode::Text(_) | VNode::Fragment(_) | VNode::Slot(_) => None,
		}
	}

	#[must_use]
	pub fn children(&self) -> &[VNode] {
		match self {
			VNode::Text(_) => &[],
			VNode::Element(ElementNode { children, .. })
			| VNode::Fragment(FragmentNode { children, .. })
			| VNode::Component(ComponentNode { children, .. })
			| VNode::Slot(SlotNode { children }) => children.as_slice(),
		}
	}

	/// The live binding.
	///
	/// For fragments, this is the host their children were mounted into.
	/// For components, it's the first surface node they rendered.
	#[must_use]
	pub fn el(&self) -> Option<NodeId> {
		match self {
			VNode::Text(TextNode { el, .. })
			| VNode::Element(ElementNode { el, .. })
			| VNode::Fragment(FragmentNode { el, .. })
			| VNode::Component(ComponentNode { el, .. }) => *el,
			VNode::Slot(_) => None,
		}
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		match self {
			VNode::Component(ComponentNode { instance, .. }) => instance.is_some(),
			other => other.el().is_some(),
		}
	}

	/// The first surface node this node contributes to its host.
	#[must_use]
	pub fn first_surface_node(&self) -> Option<NodeId> {
		match self {
			VNode::Text(TextNode { el, .. }) | VNode::Element(ElementNode { el, .. }) => *el,
			VNode::Fragment(FragmentNode { children, .. }) => children.iter().find_map(VNode::first_surface_node),
			VNode::Component(ComponentNode { instance, el, .. }) => instance.as_ref().map_or(*el, Component::first_element),
			VNode::Slot(_) => None,
		}
	}

	/// Collects the surface nodes this node contributes to its host, in order.
	pub fn collect_surface_nodes(&self, into: &mut Vec<NodeId>) {
		match self {
			VNode::Text(TextNode { el, .. }) | VNode::Element(ElementNode { el, .. }) => into.extend(*el),
			VNode::Fragment(FragmentNode { children, .. }) => {
				for child in children {
					child.collect_surface_nodes(into)
				}
			}
			VNode::Component(ComponentNode { instance, .. }) => {
				if let Some(instance) = instance {
					into.extend(instance.elements())
				}
			}
			VNode::Slot(_) => (),
		}
	}

	/// A deep copy without any live bindings.
	#[must_use]
	pub fn template(&self) -> VNode {
		fn templates(children: &[VNode]) -> Vec<VNode> {
			children.iter().map(VNode::template).collect()
		}

		match self {
			VNode::Text(TextNode { value, .. }) => text(value.clone()),
			VNode::Element(ElementNode { tag, props, children, .. }) => element(tag.clone(), props.clone(), templates(children)),
			VNode::Fragment(FragmentNode { children, .. }) => fragment(templates(children)),
			VNode::Component(ComponentNode { component_type, props, children, .. }) => component(component_type, props.clone(), templates(children)),
			VNode::Slot(SlotNode { children }) => slot(templates(children)),
		}
	}
}

/// Splices fragments' children into the list they appear in, recursively.
pub(crate) fn flatten(children: Vec<VNode>, into: &mut Vec<VNode>) {
	for child in children {
		match child {
			VNode::Fragment(fragment) => flatten(fragment.children, into),
			other => into.push(other),
		}
	}
}

/// Like [`flatten`], but keeps the tree intact.
pub(crate) fn flatten_mut<'a>(children: &'a mut [VNode], into: &mut Vec<&'a mut VNode>) {
	for child in children {
		match child {
			VNode::Fragment(fragment) => flatten_mut(&mut fragment.children, into),
			other => into.push(other),
		}
	}
}

/// Replaces each [`VNode::Slot`] in `vdom` with the `external` content, or with the slot's default content if there is none.
/// Slots without any content are removed.
///
/// Components' children are left alone. They are external content of a different component.
pub(crate) fn fill_slots(vdom: &mut VNode, external: &[VNode]) {
	match vdom {
		VNode::Slot(slot) => {
			let content = slot_content(slot, external);
			*vdom = fragment(content);
		}
		VNode::Element(ElementNode { children, .. }) | VNode::Fragment(FragmentNode { children, .. }) => fill_child_slots(children, external),
		VNode::Text(_) | VNode::Component(_) => (),
	}
}

fn fill_child_slots(children: &mut Vec<VNode>, external: &[VNode]) {
	let mut i = 0;
	while i < children.len() {
		if let VNode::Slot(slot) = &mut children[i] {
			let content = slot_content(slot, external);
			if content.is_empty() {
				children.remove(i);
				continue;
			}
			children[i] = fragment(content);
		} else {
			fill_slots(&mut children[i], external);
		}
		i += 1;
	}
}

fn slot_content(slot: &mut SlotNode, external: &[VNode]) -> Vec<VNode> {
	if external.is_empty() {
		mem::take(&mut slot.children)
	} else {
		external.iter().map(VNode::template).collect()
	}
}
