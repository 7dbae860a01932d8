#![cfg(not(target_arch = "wasm32"))]

use proptest::prelude::*;
use std::rc::Rc;
use twig_dom::{diff_sequence, element, text, DiffOp, HeadlessSurface, Props, Renderer, Scheduler, Surface as _, VNode};


fn replay<T: Clone>(old: &[T], script: &[DiffOp<T>]) -> Vec<T> {
	let mut working = old.to_vec();
	for op in script {
		match op {
			DiffOp::Add { index, item } => working.insert(*index, item.clone()),
			DiffOp::Remove { index, .. } => {
				working.remove(*index);
			}
			DiffOp::Move { from, index, .. } => {
				let item = working.remove(*from);
				working.insert(*index, item);
			}
			DiffOp::Noop { .. } => (),
		}
	}
	working
}

/// [`None`] becomes a text node, keys become keyed `<li>`s.
fn children(items: &[Option<u8>]) -> Vec<VNode> {
	items
		.iter()
		.enumerate()
		.map(|(i, item)| match item {
			Some(key) => element("li", Props::new().key(*key), vec![text(key.to_string())]),
			None => text(format!("t{}", i)),
		})
		.collect()
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(500))]

	#[test]
	fn replaying_the_script_yields_the_target(
		old in prop::collection::vec(0u8..6, 0..10),
		new in prop::collection::vec(0u8..6, 0..10)
	) {
		let script = diff_sequence(&old, &new, |a, b| a == b);
		prop_assert_eq!(replay(&old, &script), new);
	}

	#[test]
	fn scripts_stay_in_bounds_and_track_original_positions(
		old in prop::collection::vec(0u8..6, 0..10),
		new in prop::collection::vec(0u8..6, 0..10)
	) {
		let script = diff_sequence(&old, &new, |a, b| a == b);

		let moves = script.iter().filter(|op| matches!(op, DiffOp::Move { .. })).count();
		prop_assert!(moves <= old.len());

		let mut claimed = vec![];
		for op in &script {
			match op {
				DiffOp::Add { index, .. } => prop_assert!(*index < new.len()),
				DiffOp::Move { from, index, item, original_index } => {
					prop_assert!(*index < *from);
					prop_assert!(*index < new.len());
					claimed.push((*original_index, *item));
				}
				DiffOp::Noop { index, item, original_index } => {
					prop_assert!(*index < new.len());
					claimed.push((*original_index, *item));
				}
				DiffOp::Remove { item, original_index, .. } => claimed.push((*original_index, *item)),
			}
		}

		let mut used = vec![false; old.len()];
		for (original_index, item) in claimed {
			let original = original_index.expect("only added items lack an original index");
			prop_assert_eq!(old[original], item);
			prop_assert!(!used[original]);
			used[original] = true;
		}
		prop_assert!(used.into_iter().all(|used| used));
	}

	#[test]
	fn identical_sequences_are_all_noops(items in prop::collection::vec(0u8..6, 0..10)) {
		let script = diff_sequence(&items, &items, |a, b| a == b);
		prop_assert_eq!(script.len(), items.len());
		prop_assert!(script.iter().all(|op| matches!(op, DiffOp::Noop { .. })), "expected every op to be Noop");
	}

	#[test]
	fn patching_matches_a_fresh_mount(
		old in prop::collection::vec(prop::option::weighted(0.8, 0u8..6), 0..8),
		new in prop::collection::vec(prop::option::weighted(0.8, 0u8..6), 0..8)
	) {
		headless_fixture_::init_logging();
		let surface = Rc::new(HeadlessSurface::new());
		let renderer = Renderer::new(surface.clone(), Scheduler::new());

		let patched = surface.create_element("body");
		let mut old_tree = element("ul", Props::new(), children(&old));
		renderer.mount(&mut old_tree, patched, None).unwrap();
		let ul = old_tree.el().unwrap();
		let mut new_tree = element("ul", Props::new(), children(&new));
		renderer.patch(old_tree, &mut new_tree, patched).unwrap();

		let fresh = surface.create_element("body");
		renderer.mount(&mut element("ul", Props::new(), children(&new)), fresh, None).unwrap();

		prop_assert_eq!(surface.inner_html(patched), surface.inner_html(fresh));
		prop_assert_eq!(new_tree.el(), Some(ul));
		let bound: Vec<_> = new_tree.children().iter().map(|child| child.el().unwrap()).collect();
		prop_assert_eq!(bound, surface.children(ul));

		renderer.destroy(&mut new_tree).unwrap();
		prop_assert!(surface.children(patched).is_empty());
	}
}
