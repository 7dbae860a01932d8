//! An in-memory [`Surface`], for tests and for driving the reconciler without a browser.

use crate::surface::{Listener, NodeId, Surface};
use core::{
	cell::{Cell, RefCell},
	fmt::Write as _,
	mem,
};
use hashbrown::HashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{error, trace, warn};

#[derive(Debug)]
enum Content {
	Element {
		tag: String,
		attributes: BTreeMap<String, String>,
		classes: Vec<String>,
		style: BTreeMap<String, String>,
		listeners: Vec<(String, Listener)>,
	},
	Text(String),
}

#[derive(Debug)]
struct Node {
	content: Content,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// A tree of plain nodes that records everything the renderer does to it.
///
/// Removed nodes stay inspectable (and keep their subtree), they are just detached.
/// [`HeadlessSurface::collect_garbage`] releases them.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
	nodes: RefCell<HashMap<NodeId, Node>>,
	removed: RefCell<Vec<NodeId>>,
	next_id: Cell<u64>,
}

impl HeadlessSurface {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn add(&self, content: Content) -> NodeId {
		let id = NodeId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.nodes.borrow_mut().insert(id, Node { content, parent: None, children: vec![] });
		id
	}

	fn with_element<T>(&self, node: NodeId, f: impl FnOnce(&mut String, &mut BTreeMap<String, String>, &mut Vec<String>, &mut BTreeMap<String, String>, &mut Vec<(String, Listener)>) -> T) -> Option<T> {
		match self.nodes.borrow_mut().get_mut(&node).map(|node| &mut node.content) {
			Some(Content::Element {
				tag,
				attributes,
				classes,
				style,
				listeners,
			}) => Some(f(tag, attributes, classes, style, listeners)),
			Some(Content::Text(_)) => {
				error!("Expected element but found text node {:?}.", node);
				None
			}
			None => {
				error!("Unknown node {:?}.", node);
				None
			}
		}
	}

	fn detach(nodes: &mut HashMap<NodeId, Node>, node: NodeId) {
		let parent = match nodes.get_mut(&node) {
			Some(node) => node.parent.take(),
			None => return,
		};
		if let Some(parent) = parent.and_then(|parent| nodes.get_mut(&parent)) {
			parent.children.retain(|child| *child != node)
		}
	}

	fn is_ancestor(nodes: &HashMap<NodeId, Node>, ancestor: NodeId, mut node: NodeId) -> bool {
		loop {
			if node == ancestor {
				return true;
			}
			match nodes.get(&node).and_then(|node| node.parent) {
				Some(parent) => node = parent,
				None => return false,
			}
		}
	}

	/// Invokes the listeners for `event` currently attached to `node`, in attachment order.
	///
	/// Listeners may freely modify this surface. Returns how many listeners were invoked.
	pub fn dispatch_event(&self, node: NodeId, event: &str, payload: &Value) -> usize {
		let listeners: Vec<Listener> = self
			.with_element(node, |_, _, _, _, listeners| listeners.iter().filter(|(name, _)| name == event).map(|(_, listener)| listener.clone()).collect())
			.unwrap_or_default();
		trace!("Dispatching {:?} to {} listener(s).", event, listeners.len());
		for listener in &listeners {
			listener.call(payload)
		}
		listeners.len()
	}

	/// Drops every removed node that is still detached, along with its subtree.
	///
	/// Nodes that were never attached (like a host created for mounting) are kept.
	/// Returns how many nodes were dropped.
	pub fn collect_garbage(&self) -> usize {
		let mut pending: Vec<NodeId> = mem::take(&mut *self.removed.borrow_mut());
		let mut dropped = vec![];
		{
			let mut nodes = self.nodes.borrow_mut();
			pending.retain(|node| nodes.get(node).map_or(false, |node| node.parent.is_none()));
			while let Some(node) = pending.pop() {
				if let Some(node) = nodes.remove(&node) {
					pending.extend(node.children.iter().copied());
					dropped.push(node);
				}
			}
		}
		trace!("Collected {} node(s).", dropped.len());
		dropped.len()
	}

	#[must_use]
	pub fn contains(&self, node: NodeId) -> bool {
		self.nodes.borrow().contains_key(&node)
	}

	#[must_use]
	pub fn tag(&self, node: NodeId) -> Option<String> {
		match &self.nodes.borrow().get(&node)?.content {
			Content::Element { tag, .. } => Some(tag.clone()),
			Content::Text(_) => None,
		}
	}

	/// The value of a text node.
	#[must_use]
	pub fn text(&self, node: NodeId) -> Option<String> {
		match &self.nodes.borrow().get(&node)?.content {
			Content::Text(text) => Some(text.clone()),
			Content::Element { .. } => None,
		}
	}

	/// All text below `node`, concatenated.
	#[must_use]
	pub fn text_content(&self, node: NodeId) -> String {
		fn collect(nodes: &HashMap<NodeId, Node>, node: NodeId, into: &mut String) {
			if let Some(node) = nodes.get(&node) {
				match &node.content {
					Content::Text(text) => into.push_str(text),
					Content::Element { .. } => {
						for child in &node.children {
							collect(nodes, *child, into)
						}
					}
				}
			}
		}

		let mut text = String::new();
		collect(&self.nodes.borrow(), node, &mut text);
		text
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		match &self.nodes.borrow().get(&node)?.content {
			Content::Element { attributes, .. } => attributes.get(name).cloned(),
			Content::Text(_) => None,
		}
	}

	#[must_use]
	pub fn classes(&self, node: NodeId) -> Vec<String> {
		match self.nodes.borrow().get(&node).map(|node| &node.content) {
			Some(Content::Element { classes, .. }) => classes.clone(),
			_ => vec![],
		}
	}

	#[must_use]
	pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
		match &self.nodes.borrow().get(&node)?.content {
			Content::Element { style, .. } => style.get(property).cloned(),
			Content::Text(_) => None,
		}
	}

	#[must_use]
	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.nodes.borrow().get(&node).map(|node| node.children.clone()).unwrap_or_default()
	}

	#[must_use]
	pub fn parent(&self, node: NodeId) -> Option<NodeId> {
		self.nodes.borrow().get(&node)?.parent
	}

	/// How many listeners for `event` are attached to `node`.
	#[must_use]
	pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
		match self.nodes.borrow().get(&node).map(|node| &node.content) {
			Some(Content::Element { listeners, .. }) => listeners.iter().filter(|(name, _)| name == event).count(),
			_ => 0,
		}
	}

	/// Serialises `node` and its subtree. Listeners aren't included.
	#[must_use]
	pub fn to_html(&self, node: NodeId) -> String {
		let mut html = String::new();
		write_html(&self.nodes.borrow(), node, &mut html);
		html
	}

	/// Serialises the children of `node`.
	#[must_use]
	pub fn inner_html(&self, node: NodeId) -> String {
		let nodes = self.nodes.borrow();
		let mut html = String::new();
		for child in nodes.get(&node).map(|node| node.children.as_slice()).unwrap_or_default() {
			write_html(&nodes, *child, &mut html);
		}
		html
	}
}

fn write_html(nodes: &HashMap<NodeId, Node>, node: NodeId, html: &mut String) {
	let node = match nodes.get(&node) {
		Some(node) => node,
		None => return,
	};
	match &node.content {
		Content::Text(text) => html.push_str(&escape(text)),
		Content::Element {
			tag,
			attributes,
			classes,
			style,
			..
		} => {
			html.push('<');
			html.push_str(tag);
			if !classes.is_empty() {
				let _ = write!(html, " class=\"{}\"", escape(&classes.join(" ")));
			}
			if !style.is_empty() {
				let style: Vec<String> = style.iter().map(|(property, value)| format!("{}: {};", property, value)).collect();
				let _ = write!(html, " style=\"{}\"", escape(&style.join(" ")));
			}
			for (name, value) in attributes {
				let _ = write!(html, " {}=\"{}\"", name, escape(value));
			}
			html.push('>');
			for child in &node.children {
				write_html(nodes, *child, html);
			}
			let _ = write!(html, "</{}>", tag);
		}
	}
}

fn escape(text: &str) -> String {
	text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

impl Surface for HeadlessSurface {
	fn create_element(&self, tag: &str) -> NodeId {
		self.add(Content::Element {
			tag: tag.to_owned(),
			attributes: BTreeMap::new(),
			classes: vec![],
			style: BTreeMap::new(),
			listeners: vec![],
		})
	}

	fn create_text(&self, value: &str) -> NodeId {
		self.add(Content::Text(value.to_owned()))
	}

	fn set_text(&self, node: NodeId, value: &str) {
		match self.nodes.borrow_mut().get_mut(&node).map(|node| &mut node.content) {
			Some(Content::Text(text)) => *text = value.to_owned(),
			Some(Content::Element { .. }) => error!("Can't set text of element {:?}.", node),
			None => error!("Unknown node {:?}.", node),
		}
	}

	fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
		if reference == Some(child) {
			return;
		}

		let mut nodes = self.nodes.borrow_mut();
		match nodes.get(&parent).map(|parent| &parent.content) {
			Some(Content::Element { .. }) => (),
			Some(Content::Text(_)) => return error!("Can't insert into text node {:?}.", parent),
			None => return error!("Unknown parent {:?}.", parent),
		}
		if !nodes.contains_key(&child) {
			return error!("Unknown child {:?}.", child);
		}
		if Self::is_ancestor(&nodes, child, parent) {
			return error!("Can't insert {:?} into its own subtree.", child);
		}

		Self::detach(&mut nodes, child);
		if let Some(node) = nodes.get_mut(&child) {
			node.parent = Some(parent);
		}
		if let Some(parent) = nodes.get_mut(&parent) {
			match reference.and_then(|reference| parent.children.iter().position(|sibling| *sibling == reference)) {
				Some(position) => parent.children.insert(position, child),
				None => {
					if reference.is_some() {
						warn!("Reference node {:?} isn't a child of {:?}. Appending instead.", reference, parent.children);
					}
					parent.children.push(child)
				}
			}
		}
	}

	fn remove(&self, node: NodeId) {
		Self::detach(&mut self.nodes.borrow_mut(), node);
		self.removed.borrow_mut().push(node);
	}

	fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
		self.with_element(node, |_, attributes, _, _, _| attributes.insert(name.to_owned(), value.to_owned()));
	}

	fn remove_attribute(&self, node: NodeId, name: &str) {
		self.with_element(node, |_, attributes, _, _, _| attributes.remove(name));
	}

	fn add_class(&self, node: NodeId, class: &str) {
		self.with_element(node, |_, _, classes, _, _| {
			if !classes.iter().any(|existing| existing == class) {
				classes.push(class.to_owned())
			}
		});
	}

	fn remove_class(&self, node: NodeId, class: &str) {
		self.with_element(node, |_, _, classes, _, _| classes.retain(|existing| existing != class));
	}

	fn set_style(&self, node: NodeId, property: &str, value: &str) {
		self.with_element(node, |_, _, _, style, _| style.insert(property.to_owned(), value.to_owned()));
	}

	fn remove_style(&self, node: NodeId, property: &str) {
		self.with_element(node, |_, _, _, style, _| style.remove(property));
	}

	fn add_event_listener(&self, node: NodeId, event: &str, listener: &Listener) {
		self.with_element(node, |_, _, _, _, listeners| {
			if !listeners.iter().any(|(name, existing)| name == event && existing.ptr_eq(listener)) {
				listeners.push((event.to_owned(), listener.clone()))
			}
		});
	}

	fn remove_event_listener(&self, node: NodeId, event: &str, listener: &Listener) {
		self.with_element(node, |_, _, _, _, listeners| listeners.retain(|(name, existing)| !(name == event && existing.ptr_eq(listener))));
	}

	fn child_count(&self, parent: NodeId) -> usize {
		self.nodes.borrow().get(&parent).map_or(0, |parent| parent.children.len())
	}

	fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
		self.nodes.borrow().get(&parent)?.children.get(index).copied()
	}

	fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
		self.nodes.borrow().get(&parent)?.children.iter().position(|sibling| *sibling == child)
	}
}
