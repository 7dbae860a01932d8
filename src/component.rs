//! Stateful components: Descriptors ([`ComponentDef`]) and their mounted instances ([`Component`]).

use crate::{
	dispatcher::{CommandHandler, Dispatcher, Subscription},
	render::{Owner, Renderer},
	scheduler::{Completion, JobResult},
	surface::{NodeId, Surface},
	vnode::{fill_slots, Handler, VNode},
	Error,
};
use core::{
	cell::{Ref, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::{
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{instrument, trace, trace_span, warn};

type StateFn = Box<dyn Fn(&Map<String, Value>) -> Value>;
type RenderFn = Box<dyn Fn(&Component) -> VNode>;
type Hook = Box<dyn Fn(&Component) -> Completion>;
type Method = Box<dyn Fn(&Component, &Value) -> anyhow::Result<Value>>;

/// Names that [`Component`] already uses for its own operations.
pub const RESERVED_NAMES: &[&str] = &[
	"mount",
	"unmount",
	"render",
	"emit",
	"update_props",
	"update_state",
	"on_mounted",
	"on_unmounted",
	"props",
	"state",
	"elements",
	"first_element",
	"offset",
	"call",
];

/// A component type. Two component nodes are of the same type iff their [`ComponentType`]s are [`Rc::ptr_eq`].
pub type ComponentType = Rc<ComponentDef>;

/// Describes a component: How to render it, its initial state, lifecycle hooks and extra methods.
pub struct ComponentDef {
	name: String,
	state: Option<StateFn>,
	render: RenderFn,
	on_mounted: Option<Hook>,
	on_unmounted: Option<Hook>,
	methods: BTreeMap<String, Method>,
}

impl ComponentDef {
	/// Starts a definition. `render` is called with the instance whenever it needs a fresh tree.
	pub fn builder(name: impl Into<String>, render: impl 'static + Fn(&Component) -> VNode) -> ComponentDefBuilder {
		ComponentDefBuilder {
			name: name.into(),
			state: None,
			render: Box::new(render),
			on_mounted: None,
			on_unmounted: None,
			methods: vec![],
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn methods(&self) -> impl Iterator<Item = &str> {
		self.methods.keys().map(String::as_str)
	}
}

impl Debug for ComponentDef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComponentDef")
			.field("name", &self.name)
			.field("state", &self.state.is_some())
			.field("on_mounted", &self.on_mounted.is_some())
			.field("on_unmounted", &self.on_unmounted.is_some())
			.field("methods", &self.methods.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Shorthand for [`ComponentDef::builder`].
pub fn define_component(name: impl Into<String>, render: impl 'static + Fn(&Component) -> VNode) -> ComponentDefBuilder {
	ComponentDef::builder(name, render)
}

#[must_use = "Call `.build()` to get a ComponentType."]
pub struct ComponentDefBuilder {
	name: String,
	state: Option<StateFn>,
	render: RenderFn,
	on_mounted: Option<Hook>,
	on_unmounted: Option<Hook>,
	methods: Vec<(String, Method)>,
}

impl ComponentDefBuilder {
	/// Computes the initial state from the initial props. Must return a JSON object.
	pub fn state(mut self, state: impl 'static + Fn(&Map<String, Value>) -> Value) -> Self {
		self.state = Some(Box::new(state));
		self
	}

	/// Runs as scheduled job after the instance was mounted.
	pub fn on_mounted(mut self, hook: impl 'static + Fn(&Component) -> JobResult) -> Self {
		self.on_mounted = Some(Box::new(move |component| hook(component).into()));
		self
	}

	/// Runs as scheduled job after the instance was unmounted.
	pub fn on_unmounted(mut self, hook: impl 'static + Fn(&Component) -> JobResult) -> Self {
		self.on_unmounted = Some(Box::new(move |component| hook(component).into()));
		self
	}

	pub fn on_mounted_async<F: 'static + Future<Output = JobResult>>(mut self, hook: impl 'static + Fn(&Component) -> F) -> Self {
		self.on_mounted = Some(Box::new(move |component| Completion::Deferred(hook(component).boxed_local())));
		self
	}

	pub fn on_unmounted_async<F: 'static + Future<Output = JobResult>>(mut self, hook: impl 'static + Fn(&Component) -> F) -> Self {
		self.on_unmounted = Some(Box::new(move |component| Completion::Deferred(hook(component).boxed_local())));
		self
	}

	/// Adds a method that can be invoked through [`Component::call`].
	pub fn method(mut self, name: impl Into<String>, method: impl 'static + Fn(&Component, &Value) -> anyhow::Result<Value>) -> Self {
		self.methods.push((name.into(), Box::new(method)));
		self
	}

	/// # Errors
	///
	/// - [`Error::ReservedMethod`] iff a method is named like one of the [`RESERVED_NAMES`].
	/// - [`Error::DuplicateMethod`] iff two methods share a name.
	pub fn build(self) -> Result<ComponentType, Error> {
		let mut methods = BTreeMap::new();
		for (name, method) in self.methods {
			if RESERVED_NAMES.contains(&name.as_str()) {
				return Err(Error::ReservedMethod(name));
			}
			if methods.contains_key(&name) {
				return Err(Error::DuplicateMethod(name));
			}
			methods.insert(name, method);
		}

		Ok(Rc::new(ComponentDef {
			name: self.name,
			state: self.state,
			render: self.render,
			on_mounted: self.on_mounted,
			on_unmounted: self.on_unmounted,
			methods,
		}))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
	Unmounted,
	Mounted,
	/// Unmounted after having been mounted. Terminal.
	Retired,
}

struct Inner {
	component_type: ComponentType,
	props: Map<String, Value>,
	state: Map<String, Value>,
	vdom: Option<VNode>,
	host: Option<NodeId>,
	/// The host child right before this instance's nodes, for locating an empty fragment root.
	anchor: Option<NodeId>,
	lifecycle: Lifecycle,
	dirty: bool,
	external: Vec<VNode>,
	events: BTreeMap<String, Handler>,
	parent: Option<WeakComponent>,
	dispatcher: Dispatcher,
	subscriptions: Vec<Subscription>,
	renderer: Renderer,
}

/// A component instance.
///
/// This is a shared handle. Clones refer to the same instance.
///
/// No internal borrow is held while user code (render functions, hooks, methods, handlers) runs,
/// but the [`Ref`]s returned by [`Component::props`] and [`Component::state`] must be dropped before the instance is updated.
#[derive(Clone)]
pub struct Component(Rc<RefCell<Inner>>);

#[derive(Clone)]
pub struct WeakComponent(Weak<RefCell<Inner>>);
impl WeakComponent {
	#[must_use]
	pub fn upgrade(&self) -> Option<Component> {
		self.0.upgrade().map(Component)
	}
}
impl Debug for WeakComponent {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WeakComponent").field(&self.0.as_ptr()).finish()
	}
}

impl Component {
	/// Instantiates `component_type` without mounting it.
	///
	/// `events` are subscribed to the instance's emitted events on mount, and receive `parent` as owner.
	///
	/// # Errors
	///
	/// [`Error::NotAnObject`] iff the type's initial state isn't a JSON object.
	pub fn new(component_type: &ComponentType, props: Map<String, Value>, events: BTreeMap<String, Handler>, parent: Option<&Component>, renderer: Renderer) -> Result<Self, Error> {
		let state = match &component_type.state {
			None => Map::new(),
			Some(state) => match state(&props) {
				Value::Object(state) => state,
				_ => return Err(Error::NotAnObject),
			},
		};

		Ok(Self(Rc::new(RefCell::new(Inner {
			component_type: component_type.clone(),
			props,
			state,
			vdom: None,
			host: None,
			anchor: None,
			lifecycle: Lifecycle::Unmounted,
			dirty: false,
			external: vec![],
			events,
			parent: parent.map(Component::downgrade),
			dispatcher: Dispatcher::new(),
			subscriptions: vec![],
			renderer,
		}))))
	}

	#[must_use]
	pub fn downgrade(&self) -> WeakComponent {
		WeakComponent(Rc::downgrade(&self.0))
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub fn component_type(&self) -> ComponentType {
		self.0.borrow().component_type.clone()
	}

	#[must_use]
	pub fn lifecycle(&self) -> Lifecycle {
		self.0.borrow().lifecycle
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.lifecycle() == Lifecycle::Mounted
	}

	#[must_use]
	pub fn host(&self) -> Option<NodeId> {
		self.0.borrow().host
	}

	#[must_use]
	pub fn props(&self) -> Ref<'_, Map<String, Value>> {
		Ref::map(self.0.borrow(), |inner| &inner.props)
	}

	#[must_use]
	pub fn state(&self) -> Ref<'_, Map<String, Value>> {
		Ref::map(self.0.borrow(), |inner| &inner.state)
	}

	#[must_use]
	pub fn prop(&self, name: &str) -> Option<Value> {
		self.0.borrow().props.get(name).cloned()
	}

	#[must_use]
	pub fn state_value(&self, name: &str) -> Option<Value> {
		self.0.borrow().state.get(name).cloned()
	}

	/// The component that rendered this one, if it's still around.
	#[must_use]
	pub fn parent(&self) -> Option<Component> {
		self.0.borrow().parent.as_ref().and_then(WeakComponent::upgrade)
	}

	/// Renders a fresh tree from the current props and state, with slots filled.
	#[must_use]
	pub fn render(&self) -> VNode {
		let component_type = self.component_type();
		let mut vdom = (component_type.render)(self);
		fill_slots(&mut vdom, &self.0.borrow().external);
		vdom
	}

	/// Replaces the content rendered into this instance's slots. Takes effect with the next render.
	pub fn set_external_content(&self, external: Vec<VNode>) {
		self.0.borrow_mut().external = external;
	}

	/// The surface nodes this instance contributes to its host, in order.
	#[must_use]
	pub fn elements(&self) -> Vec<NodeId> {
		let mut elements = vec![];
		if let Some(vdom) = &self.0.borrow().vdom {
			vdom.collect_surface_nodes(&mut elements)
		}
		elements
	}

	#[must_use]
	pub fn first_element(&self) -> Option<NodeId> {
		self.0.borrow().vdom.as_ref().and_then(VNode::first_surface_node)
	}

	/// Where this instance's nodes start within its host, if it renders a fragment. 0 otherwise.
	#[must_use]
	pub fn offset(&self) -> usize {
		let inner = self.0.borrow();
		match (&inner.vdom, inner.host) {
			(Some(vdom @ VNode::Fragment(_)), Some(host)) => start_index(vdom, host, inner.anchor, &**inner.renderer.surface()),
			_ => 0,
		}
	}

	/// Renders and mounts this instance into `host` at `index` (appending if [`None`]).
	///
	/// Returns the number of surface nodes inserted into `host`.
	/// The caller is responsible for scheduling [`Component::on_mounted`].
	///
	/// # Errors
	///
	/// - [`Error::ComponentAlreadyMounted`] or [`Error::ComponentRetired`] iff not currently unmounted.
	/// - Any error encountered while mounting the rendered tree.
	#[instrument(skip(self), fields(component = %self.component_type().name))]
	pub fn mount(&self, host: NodeId, index: Option<usize>) -> Result<usize, Error> {
		match self.lifecycle() {
			Lifecycle::Unmounted => (),
			Lifecycle::Mounted => return Err(Error::ComponentAlreadyMounted),
			Lifecycle::Retired => return Err(Error::ComponentRetired),
		}

		let renderer = self.0.borrow().renderer.clone();
		let mut vdom = self.render();
		let anchor = match vdom {
			VNode::Fragment(_) => {
				let surface = renderer.surface();
				let position = index.map_or_else(|| surface.child_count(host), |index| index.min(surface.child_count(host)));
				preceding_sibling(&**surface, host, position)
			}
			_ => None,
		};
		let count = renderer.mount_node(&mut vdom, host, index, Some(self))?;

		let parent = self.0.borrow().parent.clone();
		let (events, dispatcher) = {
			let inner = self.0.borrow();
			(inner.events.clone(), inner.dispatcher.clone())
		};
		let subscriptions = events
			.into_iter()
			.map(|(name, handler)| {
				let parent = parent.clone();
				dispatcher.subscribe(
					name,
					CommandHandler::new(move |payload| {
						let parent = parent.as_ref().and_then(WeakComponent::upgrade);
						handler.call(payload, parent.as_ref())
					}),
				)
			})
			.collect();

		let mut inner = self.0.borrow_mut();
		inner.vdom = Some(vdom);
		inner.host = Some(host);
		inner.anchor = anchor;
		inner.subscriptions = subscriptions;
		inner.lifecycle = Lifecycle::Mounted;
		trace!("Mounted {} node(s).", count);
		Ok(count)
	}

	/// Destroys the rendered tree and drops event subscriptions. The instance can't be mounted again.
	///
	/// The caller is responsible for scheduling [`Component::on_unmounted`].
	///
	/// # Errors
	///
	/// - [`Error::ComponentNotMounted`] iff not currently mounted.
	/// - Any error encountered while destroying the rendered tree.
	#[instrument(skip(self), fields(component = %self.component_type().name))]
	pub fn unmount(&self) -> Result<(), Error> {
		let (vdom, subscriptions, renderer) = {
			let mut inner = self.0.borrow_mut();
			if inner.lifecycle != Lifecycle::Mounted {
				return Err(Error::ComponentNotMounted);
			}
			inner.lifecycle = Lifecycle::Retired;
			inner.host = None;
			inner.anchor = None;
			inner.dirty = false;
			(inner.vdom.take(), std::mem::take(&mut inner.subscriptions), inner.renderer.clone())
		};

		for subscription in subscriptions {
			subscription.unsubscribe()
		}
		match vdom {
			Some(mut vdom) => renderer.destroy_node(&mut vdom),
			None => Ok(()),
		}
	}

	/// Shallow-merges `props` into the current props and re-renders synchronously iff that changed them.
	///
	/// # Errors
	///
	/// - [`Error::ComponentNotMounted`] iff not currently mounted.
	/// - Any error encountered while patching.
	pub fn update_props(&self, props: Map<String, Value>) -> Result<(), Error> {
		self.receive(props, None)
	}

	/// Like [`Component::update_props`], but also replaces the external content.
	/// Re-renders unconditionally if there was or is external content, since that can't be compared.
	pub(crate) fn receive(&self, props: Map<String, Value>, external: Option<Vec<VNode>>) -> Result<(), Error> {
		let changed = {
			let mut inner = self.0.borrow_mut();
			if inner.lifecycle != Lifecycle::Mounted {
				return Err(Error::ComponentNotMounted);
			}

			let mut slots_changed = false;
			if let Some(external) = external {
				slots_changed = !inner.external.is_empty() || !external.is_empty();
				inner.external = external;
			}

			let mut merged = inner.props.clone();
			merged.extend(props);
			let props_changed = merged != inner.props;
			inner.props = merged;
			props_changed || slots_changed
		};

		if changed {
			self.patch()
		} else {
			trace!("Props unchanged. Skipping render.");
			Ok(())
		}
	}

	/// Shallow-merges `partial` into the state and schedules a re-render.
	///
	/// Calls within the same scheduler turn are batched into one render that sees all of them.
	///
	/// # Errors
	///
	/// - [`Error::NotAnObject`] iff `partial` isn't a JSON object.
	/// - [`Error::ComponentNotMounted`] iff not currently mounted.
	pub fn update_state(&self, partial: Value) -> Result<(), Error> {
		let partial = match partial {
			Value::Object(partial) => partial,
			_ => return Err(Error::NotAnObject),
		};

		let scheduler = {
			let mut inner = self.0.borrow_mut();
			if inner.lifecycle != Lifecycle::Mounted {
				return Err(Error::ComponentNotMounted);
			}
			inner.state.extend(partial);
			if inner.dirty {
				trace!("Render already pending.");
				return Ok(());
			}
			inner.dirty = true;
			inner.renderer.scheduler().clone()
		};

		let this = self.downgrade();
		scheduler.enqueue(move || match this.upgrade() {
			Some(component) => component.flush().map_err(anyhow::Error::from).into(),
			None => Completion::ok(),
		});
		Ok(())
	}

	/// Runs a pending state render now, if there is one.
	///
	/// # Errors
	///
	/// Any error encountered while patching.
	pub fn flush(&self) -> Result<(), Error> {
		let pending = {
			let mut inner = self.0.borrow_mut();
			let pending = inner.dirty && inner.lifecycle == Lifecycle::Mounted;
			inner.dirty = false;
			pending
		};
		if pending {
			self.patch()
		} else {
			Ok(())
		}
	}

	/// Re-renders and patches the previous tree into the fresh one.
	fn patch(&self) -> Result<(), Error> {
		let span = trace_span!("Patching component", component = %self.component_type().name);
		let _enter = span.enter();

		let (old, host, anchor, renderer) = {
			let mut inner = self.0.borrow_mut();
			let host = inner.host.ok_or(Error::ComponentNotMounted)?;
			let old = inner.vdom.take().ok_or(Error::Unbound("component"))?;
			(old, host, inner.anchor, inner.renderer.clone())
		};

		let surface = renderer.surface();
		let start = start_index(&old, host, anchor, &**surface);
		let offset = if let VNode::Fragment(_) = old { start } else { 0 };
		let mut vdom = self.render();
		let result = renderer.patch_node(old, &mut vdom, host, Some(Owner { component: self, host, offset }));

		// Nodes before `start` are not this instance's, so the patch left them in place.
		let anchor = match vdom {
			VNode::Fragment(_) => {
				let start = vdom.first_surface_node().and_then(|first| surface.index_of(host, first)).unwrap_or(start);
				preceding_sibling(&**surface, host, start)
			}
			_ => None,
		};
		let mut inner = self.0.borrow_mut();
		inner.vdom = Some(vdom);
		inner.anchor = anchor;
		result
	}

	/// Dispatches `payload` to the handlers registered for `name` by whoever rendered this instance.
	pub fn emit(&self, name: &str, payload: &Value) {
		let dispatcher = self.0.borrow().dispatcher.clone();
		dispatcher.dispatch(name, payload)
	}

	/// Invokes one of the type's extra methods with this instance as context.
	///
	/// # Errors
	///
	/// [`Error::UnknownMethod`] iff there is no such method, otherwise whatever the method returns.
	pub fn call(&self, name: &str, args: &Value) -> anyhow::Result<Value> {
		let component_type = self.component_type();
		let method = component_type.methods.get(name).ok_or_else(|| Error::UnknownMethod(name.to_owned()))?;
		method(self, args)
	}

	/// Runs the type's mounted hook, if any.
	pub fn on_mounted(&self) -> Completion {
		let component_type = self.component_type();
		component_type.on_mounted.as_ref().map_or_else(Completion::ok, |hook| hook(self))
	}

	/// Runs the type's unmounted hook, if any.
	pub fn on_unmounted(&self) -> Completion {
		let component_type = self.component_type();
		component_type.on_unmounted.as_ref().map_or_else(Completion::ok, |hook| hook(self))
	}
}

/// Where a rendered tree's nodes start within `host`.
/// A tree without nodes is located through the `anchor` it follows, and starts at 0 without one.
fn start_index(vdom: &VNode, host: NodeId, anchor: Option<NodeId>, surface: &dyn Surface) -> usize {
	match vdom.first_surface_node() {
		Some(first) => surface.index_of(host, first).unwrap_or(0),
		None => match anchor {
			None => 0,
			Some(anchor) => surface.index_of(host, anchor).map_or_else(
				|| {
					warn!("Anchor {:?} left {:?}. Placing the empty fragment first.", anchor, host);
					0
				},
				|index| index + 1,
			),
		},
	}
}

fn preceding_sibling(surface: &dyn Surface, host: NodeId, position: usize) -> Option<NodeId> {
	position.checked_sub(1).and_then(|previous| surface.child_at(host, previous))
}

impl Debug for Component {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self.0.try_borrow() {
			Ok(inner) => f
				.debug_struct("Component")
				.field("type", &inner.component_type.name)
				.field("lifecycle", &inner.lifecycle)
				.field("props", &inner.props)
				.field("state", &inner.state)
				.field("host", &inner.host)
				.finish(),
			Err(_) => f.write_str("Component(<borrowed>)"),
		}
	}
}
