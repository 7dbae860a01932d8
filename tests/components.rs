#![cfg(not(target_arch = "wasm32"))]

use anyhow::anyhow;
use serde_json::{json, Map, Value};
use std::{
	cell::{Cell, RefCell},
	collections::BTreeMap,
	rc::Rc,
};
use twig_dom::{
	component, component::Lifecycle, create_app, define_component, element, fragment, slot, text, vnode::no_children, Component, ComponentType, Error, Props, Renderer,
	Scheduler, Surface as _,
};

use headless_fixture_::surface;

fn string_prop(component: &Component, name: &str) -> String {
	component.prop(name).and_then(|value| value.as_str().map(str::to_owned)).unwrap_or_default()
}

fn label(renders: &Rc<Cell<usize>>) -> ComponentType {
	let renders = renders.clone();
	define_component("Label", move |this| {
		renders.set(renders.get() + 1);
		element("span", Props::new(), vec![text(string_prop(this, "text"))])
	})
	.build()
	.unwrap()
}

#[test]
fn app_mount_lifecycle() {
	let (surface, body) = surface();
	let label = label(&Rc::default());

	let mut app = create_app(surface.clone(), &label, Props::new().attr("text", "hi"));
	assert_eq!(app.unmount(), Err(Error::AppNotMounted));

	app.mount(body).unwrap();
	assert!(app.is_mounted());
	assert_eq!(app.host(), Some(body));
	assert_eq!(app.mount(body), Err(Error::AppAlreadyMounted));
	assert_eq!(surface.inner_html(body), "<span>hi</span>");

	app.unmount().unwrap();
	assert!(surface.children(body).is_empty());
	assert_eq!(app.unmount(), Err(Error::AppNotMounted));

	app.mount(body).unwrap();
	assert_eq!(surface.inner_html(body), "<span>hi</span>");
}

#[test]
fn update_props_renders_only_on_change() {
	let (surface, body) = surface();
	let renders = Rc::new(Cell::new(0));
	let label = label(&renders);

	let mut app = create_app(surface.clone(), &label, Props::new().attr("text", "hi"));
	app.mount(body).unwrap();
	let root = app.root().unwrap();
	let span = root.first_element().unwrap();
	assert_eq!(renders.get(), 1);

	let mut props = Map::new();
	props.insert("text".to_owned(), json!("bye"));
	root.update_props(props.clone()).unwrap();
	assert_eq!(renders.get(), 2);
	assert_eq!(surface.inner_html(body), "<span>bye</span>");
	assert_eq!(root.first_element(), Some(span));

	root.update_props(props).unwrap();
	assert_eq!(renders.get(), 2);
	assert_eq!(root.props().len(), 1);
}

#[test]
fn state_updates_are_batched() {
	let (surface, body) = surface();
	let renders = Rc::new(Cell::new(0));
	let renders_ = renders.clone();
	let counter = define_component("Counter", move |this| {
		renders_.set(renders_.get() + 1);
		element("p", Props::new(), vec![text(this.state_value("count").unwrap_or_default().to_string())])
	})
	.state(|_| json!({ "count": 0 }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &counter, Props::new());
	app.mount(body).unwrap();
	let root = app.root().unwrap();

	root.update_state(json!({ "count": 1 })).unwrap();
	root.update_state(json!({ "count": 2 })).unwrap();
	assert_eq!(root.state_value("count"), Some(json!(2)));
	assert_eq!(renders.get(), 1);
	assert_eq!(surface.inner_html(body), "<p>0</p>");

	app.next_tick();
	assert_eq!(renders.get(), 2);
	assert_eq!(surface.inner_html(body), "<p>2</p>");

	app.next_tick();
	assert_eq!(renders.get(), 2);

	assert_eq!(root.update_state(json!(3)), Err(Error::NotAnObject));
}

#[test]
fn hooks_run_on_the_next_tick_and_failures_are_isolated() {
	let (surface, body) = surface();
	let log = Rc::new(RefCell::new(Vec::<String>::new()));

	let failing = define_component("Failing", |_| text("f")).on_mounted(|_| Err(anyhow!("broken"))).build().unwrap();
	let logging = {
		let mounted_log = log.clone();
		let unmounted_log = log.clone();
		define_component("Logging", |_| text("l"))
			.on_mounted(move |this| {
				mounted_log.borrow_mut().push(format!("mounted {}", this.component_type().name()));
				Ok(())
			})
			.on_unmounted_async(move |_| {
				let log = unmounted_log.clone();
				async move {
					log.borrow_mut().push("unmounted".to_owned());
					Ok::<(), anyhow::Error>(())
				}
			})
			.build()
			.unwrap()
	};
	let parent = define_component("Parent", move |_| element("div", Props::new(), vec![component(&failing, Props::new(), no_children()), component(&logging, Props::new(), no_children())]))
		.build()
		.unwrap();

	let mut app = create_app(surface.clone(), &parent, Props::new());
	app.mount(body).unwrap();
	assert_eq!(surface.inner_html(body), "<div>fl</div>");
	assert!(log.borrow().is_empty());
	assert!(app.scheduler().is_scheduled());

	app.next_tick();
	assert_eq!(*log.borrow(), ["mounted Logging"]);

	app.unmount().unwrap();
	assert_eq!(log.borrow().len(), 1);
	app.next_tick();
	assert_eq!(*log.borrow(), ["mounted Logging", "unmounted"]);
}

#[test]
fn children_emit_to_their_parent() {
	let (surface, body) = surface();

	let picker = define_component("Picker", |_| {
		element(
			"button",
			Props::new().on("click", |_, owner| {
				if let Some(owner) = owner {
					owner.emit("pick", &json!(7))
				}
			}),
			vec![text("pick")],
		)
	})
	.build()
	.unwrap();

	let parent = define_component("Parent", move |this| {
		element(
			"div",
			Props::new(),
			vec![
				text(format!("picked: {}", this.state_value("picked").unwrap_or_default())),
				component(
					&picker,
					Props::new().on("pick", |payload, parent| parent.unwrap().update_state(json!({ "picked": payload })).unwrap()),
					no_children(),
				),
			],
		)
	})
	.state(|_| json!({ "picked": 0 }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &parent, Props::new());
	app.mount(body).unwrap();
	assert_eq!(surface.inner_html(body), "<div>picked: 0<button>pick</button></div>");

	let div = surface.children(body)[0];
	let button = surface.children(div)[1];
	assert_eq!(surface.dispatch_event(button, "click", &json!({ "type": "click" })), 1);
	app.next_tick();

	assert_eq!(surface.inner_html(body), "<div>picked: 7<button>pick</button></div>");
	assert_eq!(surface.children(div)[1], button);
}

#[test]
fn forwarded_props_only_rerender_changed_children() {
	let (surface, body) = surface();
	let renders = Rc::new(RefCell::new(Vec::<String>::new()));

	let renders_ = renders.clone();
	let child = define_component("Child", move |this| {
		let name = string_prop(this, "name");
		renders_.borrow_mut().push(name.clone());
		text(format!("{}={}", name, this.prop("value").unwrap_or_default()))
	})
	.build()
	.unwrap();

	let parent = define_component("Parent", move |this| {
		let child_node = |name: &str| component(&child, Props::new().attr("name", name).attr("value", this.state_value(name).unwrap_or_default()), no_children());
		element("div", Props::new(), vec![child_node("a"), child_node("b")])
	})
	.state(|_| json!({ "a": 0, "b": 0 }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &parent, Props::new());
	app.mount(body).unwrap();
	assert_eq!(*renders.borrow(), ["a", "b"]);

	app.root().unwrap().update_state(json!({ "a": 1 })).unwrap();
	app.next_tick();
	assert_eq!(*renders.borrow(), ["a", "b", "a"]);
	assert_eq!(surface.inner_html(body), "<div>a=1b=0</div>");
}

#[test]
fn slots_take_external_content() {
	let (surface, body) = surface();

	let card = define_component("Card", |_| element("div", Props::new().class("card"), vec![slot(vec![text("empty")])])).build().unwrap();
	let wrapper = define_component("Wrapper", move |this| {
		let filled = this.state_value("filled") == Some(Value::Bool(true));
		let content = if filled { vec![element("b", Props::new(), vec![text("content")])] } else { no_children() };
		component(&card, Props::new(), content)
	})
	.state(|_| json!({ "filled": false }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &wrapper, Props::new());
	app.mount(body).unwrap();
	assert_eq!(surface.inner_html(body), r#"<div class="card">empty</div>"#);
	let div = surface.children(body)[0];

	app.root().unwrap().update_state(json!({ "filled": true })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), r#"<div class="card"><b>content</b></div>"#);
	assert_eq!(surface.children(body), [div]);
}

#[test]
fn fragment_roots_respect_preceding_siblings() {
	let (surface, body) = surface();
	let header = surface.create_element("header");
	surface.append(body, header);

	let list = define_component("List", |this| {
		let items = this.state_value("items").and_then(|items| items.as_array().cloned()).unwrap_or_default();
		fragment(items.into_iter().map(|item| element("li", Props::new().key(item.clone()), vec![text(item.to_string())])).collect::<Vec<_>>())
	})
	.state(|_| json!({ "items": [1, 2] }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &list, Props::new());
	app.mount(body).unwrap();
	let root = app.root().unwrap();
	assert_eq!(root.offset(), 1);
	assert_eq!(surface.inner_html(body), "<header></header><li>1</li><li>2</li>");

	root.update_state(json!({ "items": [0, 1, 2] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), "<header></header><li>0</li><li>1</li><li>2</li>");

	let before = surface.children(body);
	root.update_state(json!({ "items": [2, 0, 1] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), "<header></header><li>2</li><li>0</li><li>1</li>");
	assert_eq!(surface.children(body), [before[0], before[3], before[1], before[2]]);
	assert_eq!(root.elements(), &surface.children(body)[1..]);
}

#[test]
fn empty_fragment_roots_keep_their_position() {
	let (surface, body) = surface();
	let header = surface.create_element("header");
	surface.append(body, header);

	let list = define_component("List", |this| {
		let items = this.state_value("items").and_then(|items| items.as_array().cloned()).unwrap_or_default();
		fragment(items.into_iter().map(|item| element("li", Props::new().key(item.clone()), vec![text(item.to_string())])).collect::<Vec<_>>())
	})
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &list, Props::new());
	app.mount(body).unwrap();
	let footer = surface.create_element("footer");
	surface.append(body, footer);
	let root = app.root().unwrap();
	assert_eq!(root.offset(), 1);
	assert_eq!(surface.inner_html(body), "<header></header><footer></footer>");

	root.update_state(json!({ "items": [1, 2] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), "<header></header><li>1</li><li>2</li><footer></footer>");

	root.update_state(json!({ "items": [] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), "<header></header><footer></footer>");

	root.update_state(json!({ "items": [3] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(body), "<header></header><li>3</li><footer></footer>");
	assert_eq!(surface.children(body)[0], header);
}

#[test]
fn keyed_child_components_keep_their_instances() {
	let (surface, body) = surface();
	let mounted = Rc::new(RefCell::new(Vec::<Component>::new()));
	let unmounted = Rc::new(RefCell::new(vec![]));

	let item = {
		let mounted = mounted.clone();
		let unmounted = unmounted.clone();
		define_component("Item", |this| element("li", Props::new(), vec![text(this.prop("n").map(|n| n.to_string()).unwrap_or_default())]))
			.on_mounted(move |this| {
				mounted.borrow_mut().push(this.clone());
				Ok(())
			})
			.on_unmounted(move |this| {
				unmounted.borrow_mut().push(this.prop("n").unwrap_or_default());
				Ok(())
			})
			.build()
			.unwrap()
	};
	let list = define_component("List", move |this| {
		let items = this.state_value("items").and_then(|items| items.as_array().cloned()).unwrap_or_default();
		element(
			"ul",
			Props::new(),
			items.into_iter().map(|n| component(&item, Props::new().key(n.clone()).attr("n", n), no_children())).collect::<Vec<_>>(),
		)
	})
	.state(|_| json!({ "items": [1, 2, 3] }))
	.build()
	.unwrap();

	let mut app = create_app(surface.clone(), &list, Props::new());
	app.mount(body).unwrap();
	app.next_tick();
	let root = app.root().unwrap();
	let ul = surface.children(body)[0];
	let lis = surface.children(ul);
	assert_eq!(mounted.borrow().len(), 3);
	assert!(mounted.borrow().iter().all(|instance| instance.parent().unwrap().ptr_eq(&root)));

	root.update_state(json!({ "items": [3, 1] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(ul), "<li>3</li><li>1</li>");
	assert_eq!(surface.children(ul), [lis[2], lis[0]]);
	assert_eq!(*unmounted.borrow(), [json!(2)]);
	{
		let mounted = mounted.borrow();
		assert_eq!(mounted.len(), 3);
		assert_eq!(mounted[0].elements(), [lis[0]]);
		assert_eq!(mounted[2].elements(), [lis[2]]);
		assert!(mounted[0].is_mounted() && mounted[2].is_mounted());
		assert_eq!(mounted[1].lifecycle(), Lifecycle::Retired);
	}

	root.update_state(json!({ "items": [3, 1, 2] })).unwrap();
	app.next_tick();
	assert_eq!(surface.inner_html(ul), "<li>3</li><li>1</li><li>2</li>");
	let mounted = mounted.borrow();
	assert_eq!(mounted.len(), 4);
	assert!(!mounted[3].ptr_eq(&mounted[1]));
	assert_eq!(surface.children(ul)[..2], [lis[2], lis[0]]);
}

#[test]
fn methods_are_called_with_the_instance() {
	let (surface, body) = surface();
	let greeter = define_component("Greeter", |_| text("hi"))
		.method("greet", |this, name| Ok(json!(format!("{}, {}!", string_prop(this, "greeting"), name.as_str().unwrap_or("you")))))
		.method("fail", |_, _| Err(anyhow!("nope")))
		.build()
		.unwrap();

	let mut app = create_app(surface.clone(), &greeter, Props::new().attr("greeting", "Hello"));
	app.mount(body).unwrap();
	let root = app.root().unwrap();

	assert_eq!(root.call("greet", &json!("twig")).unwrap(), json!("Hello, twig!"));
	assert_eq!(root.call("fail", &Value::Null).unwrap_err().to_string(), "nope");

	let error = root.call("missing", &Value::Null).unwrap_err();
	assert_eq!(error.downcast_ref::<Error>(), Some(&Error::UnknownMethod("missing".to_owned())));
}

#[test]
fn initial_state_must_be_an_object() {
	let (surface, body) = surface();
	let broken = define_component("Broken", |_| text("")).state(|_| json!(1)).build().unwrap();

	let mut app = create_app(surface.clone(), &broken, Props::new());
	assert_eq!(app.mount(body), Err(Error::NotAnObject));
	assert!(!app.is_mounted());
}

#[test]
fn unmounting_is_terminal() {
	let (surface, body) = surface();
	let label = label(&Rc::default());

	let mut app = create_app(surface.clone(), &label, Props::new());
	app.mount(body).unwrap();
	let root = app.root().unwrap();
	assert_eq!(root.lifecycle(), Lifecycle::Mounted);
	assert_eq!(root.host(), Some(body));

	app.unmount().unwrap();
	assert_eq!(root.lifecycle(), Lifecycle::Retired);
	assert_eq!(root.host(), None);
	assert!(root.elements().is_empty());
	assert_eq!(root.update_state(json!({})), Err(Error::ComponentNotMounted));
	assert_eq!(root.update_props(Map::new()), Err(Error::ComponentNotMounted));
	assert_eq!(root.unmount(), Err(Error::ComponentNotMounted));
	assert_eq!(root.mount(body, None), Err(Error::ComponentRetired));
}

#[test]
fn instances_mount_once() {
	let (surface, body) = surface();
	let label = label(&Rc::default());
	let renderer = Renderer::new(surface.clone(), Scheduler::new());

	let instance = Component::new(&label, Map::new(), BTreeMap::new(), None, renderer).unwrap();
	assert_eq!(instance.lifecycle(), Lifecycle::Unmounted);
	assert_eq!(instance.mount(body, None), Ok(1));
	assert_eq!(instance.mount(body, None), Err(Error::ComponentAlreadyMounted));
	assert_eq!(surface.inner_html(body), "<span></span>");
	assert!(instance.parent().is_none());
}
