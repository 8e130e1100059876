//! Pipeline assembly integration tests
//!
//! Structural properties of the linked chain under edit sequences:
//! every sequence of add/remove/move leaves exactly one tail, no id
//! referenced as `next` by more than one step, and declared types that
//! track the resolved head and tail.

use std::collections::HashSet;

use strand::{Agent, AgentCatalog, CompatibilityFilter, DataType, Pipeline};

fn agent(id: &str, input: DataType, output: DataType) -> Agent {
    Agent {
        id: id.to_string(),
        name: format!("Agent {id}"),
        input_type: input,
        output_type: output,
        agent_type: "chat".to_string(),
        requires_api_key: false,
        capability: None,
    }
}

fn catalog() -> AgentCatalog {
    AgentCatalog::from_agents(vec![
        agent("txt2txt", DataType::Text, DataType::Text),
        agent("txt2img", DataType::Text, DataType::Image),
        agent("img2txt", DataType::Image, DataType::Text),
        agent("snd2txt", DataType::Sound, DataType::Text),
        agent("doc2txt", DataType::Document, DataType::Text),
    ])
}

fn order(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .ordered()
        .expect("chain intact")
        .iter()
        .map(|s| s.id.clone())
        .collect()
}

/// Exactly one tail; no id referenced as next twice; chain covers all
fn assert_chain_invariants(pipeline: &Pipeline) {
    let seq = pipeline.ordered().expect("chain intact");
    assert_eq!(seq.len(), pipeline.len());
    assert_eq!(seq.iter().filter(|s| s.next.is_none()).count(), usize::from(!seq.is_empty()));
    let mut referenced = HashSet::new();
    for step in &seq {
        if let Some(next) = step.next.as_deref() {
            assert!(referenced.insert(next.to_string()), "'{next}' referenced twice");
            assert_ne!(step.id, next, "self-link");
        }
    }
}

#[test]
fn append_three_steps_orders_them() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    let a = p.add_step(&catalog, "txt2txt").unwrap();
    let b = p.add_step(&catalog, "txt2img").unwrap();
    let c = p.add_step(&catalog, "img2txt").unwrap();

    assert_eq!(order(&p), vec![a, b, c]);
    assert_chain_invariants(&p);
}

#[test]
fn first_step_scenario_sets_declared_types() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    p.add_step(&catalog, "txt2img").unwrap();

    assert_eq!(order(&p).len(), 1);
    assert_eq!(p.input_type(), Some(DataType::Text));
    assert_eq!(p.output_type(), Some(DataType::Image));
}

#[test]
fn move_up_then_down_restores_order() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    let a = p.add_step(&catalog, "txt2txt").unwrap();
    let b = p.add_step(&catalog, "txt2img").unwrap();
    let c = p.add_step(&catalog, "img2txt").unwrap();
    let original = order(&p);

    assert!(p.move_up(&catalog, &b).unwrap());
    assert!(p.move_down(&catalog, &b).unwrap());
    assert_eq!(order(&p), original);

    // At the boundaries the inverse is a no-op, so the round trip
    // still restores the original order.
    assert!(!p.move_up(&catalog, &a).unwrap());
    assert!(!p.move_down(&catalog, &c).unwrap());
    assert_eq!(order(&p), original);
    assert_chain_invariants(&p);
}

#[test]
fn remove_excludes_id_and_shrinks_by_one() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    p.add_step(&catalog, "txt2txt").unwrap();
    let b = p.add_step(&catalog, "txt2img").unwrap();
    p.add_step(&catalog, "img2txt").unwrap();
    let before = order(&p).len();

    p.remove_step(&catalog, &b).unwrap();
    let after = order(&p);
    assert_eq!(after.len(), before - 1);
    assert!(!after.contains(&b));
    assert_chain_invariants(&p);
}

#[test]
fn remove_sole_step_resets_to_unset() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    let a = p.add_step(&catalog, "snd2txt").unwrap();

    p.remove_step(&catalog, &a).unwrap();
    assert_eq!(p.input_type(), None);
    assert_eq!(p.output_type(), None);
    assert!(p.ordered().unwrap().is_empty());
}

#[test]
fn edit_storms_preserve_invariants() {
    let catalog = catalog();
    let agents = ["txt2txt", "txt2img", "img2txt", "snd2txt", "doc2txt"];

    // A deterministic batch of interleaved edit sequences.
    for seed in 0u64..24 {
        let mut p = Pipeline::new("svc").unwrap();
        let mut ids: Vec<String> = Vec::new();
        let mut x = seed;
        for round in 0..12 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let pick = (x >> 33) as usize;
            match pick % 4 {
                0 => {
                    let id = p
                        .add_step(&catalog, agents[pick % agents.len()])
                        .unwrap();
                    ids.push(id);
                }
                1 if !ids.is_empty() => {
                    let id = ids.remove(pick % ids.len());
                    p.remove_step(&catalog, &id).unwrap();
                }
                2 if !ids.is_empty() => {
                    let id = &ids[pick % ids.len()];
                    p.move_up(&catalog, id).unwrap();
                }
                _ if !ids.is_empty() => {
                    let id = &ids[pick % ids.len()];
                    p.move_down(&catalog, id).unwrap();
                }
                _ => {}
            }
            assert_chain_invariants(&p);
            let _ = round;
        }
    }
}

#[test]
fn compat_filter_never_offers_text_input_after_image_tail() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    p.add_step(&catalog, "txt2img").unwrap();

    let filter = CompatibilityFilter::new(&catalog);
    let offered = filter.selectable(&p, None, None);
    assert!(!offered.is_empty());
    assert!(offered.iter().all(|a| a.input_type != DataType::Text));
}

#[test]
fn persisted_nodes_use_dense_reindexed_keys() {
    let catalog = catalog();
    let mut p = Pipeline::new("svc").unwrap();
    let a = p.add_step(&catalog, "txt2txt").unwrap();
    p.add_step(&catalog, "txt2img").unwrap();
    p.add_step(&catalog, "img2txt").unwrap();
    // Shuffle so internal ids no longer match positions.
    p.move_down(&catalog, &a).unwrap();

    let json = serde_json::to_value(p.to_service_payload().unwrap()).unwrap();
    let nodes = json["workflow"]["nodes"].as_object().unwrap();
    assert_eq!(nodes.len(), 3);
    for i in 0..3 {
        let node = &nodes[&i.to_string()];
        if i + 1 < 3 {
            assert_eq!(node["next"], (i + 1).to_string());
        } else {
            assert!(node["next"].is_null());
        }
    }
}
