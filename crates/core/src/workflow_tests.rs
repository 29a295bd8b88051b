use super::*;

fn linear_workflow() -> (Workflow, NodeId, NodeId, NodeId) {
    let mut wf = Workflow::new(TaskId::new(), 0);
    let start = Node::new("start", NodePayload::Start);
    let a = Node::new("a", NodePayload::Task { prompt: "do a".into(), persona: None, timeout_ms: None });
    let end = Node::new("end", NodePayload::End);
    let (start_id, a_id, end_id) = (start.id, a.id, end.id);
    wf.nodes.push(start);
    wf.nodes.push(a);
    wf.nodes.push(end);
    wf.edges.push(Edge::new(start_id, a_id));
    wf.edges.push(Edge::new(a_id, end_id));
    (wf, start_id, a_id, end_id)
}

#[test]
fn start_nodes_finds_the_single_entry_point() {
    let (wf, start_id, _, _) = linear_workflow();
    let starts: Vec<_> = wf.start_nodes().collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].id, start_id);
}

#[test]
fn outgoing_and_incoming_edges_are_symmetric() {
    let (wf, start_id, a_id, end_id) = linear_workflow();
    let out_of_start: Vec<_> = wf.outgoing_edges(&start_id).collect();
    assert_eq!(out_of_start.len(), 1);
    assert_eq!(out_of_start[0].to, a_id);

    let into_end: Vec<_> = wf.incoming_edges(&end_id).collect();
    assert_eq!(into_end.len(), 1);
    assert_eq!(into_end[0].from, a_id);
}

#[test]
fn node_payload_node_type_matches_every_variant() {
    assert_eq!(NodePayload::Start.node_type(), NodeType::Start);
    assert_eq!(NodePayload::End.node_type(), NodeType::End);
    assert_eq!(
        NodePayload::Task { prompt: "p".into(), persona: None, timeout_ms: None }.node_type(),
        NodeType::Task
    );
    assert_eq!(NodePayload::Condition { expression: "true".into() }.node_type(), NodeType::Condition);
    assert_eq!(NodePayload::Loop { expression: "true".into() }.node_type(), NodeType::Loop);
    assert_eq!(NodePayload::Human { prompt: None }.node_type(), NodeType::Human);
    assert_eq!(NodePayload::Switch { expression: "x".into() }.node_type(), NodeType::Switch);
    assert_eq!(NodePayload::Assign { assignments: vec![] }.node_type(), NodeType::Assign);
    assert_eq!(NodePayload::Script { expression: "1".into() }.node_type(), NodeType::Script);
    assert_eq!(
        NodePayload::Foreach { items_expression: "variables.xs".into() }.node_type(),
        NodeType::Foreach
    );
}

#[test]
fn edge_builder_sets_condition_and_max_iterations() {
    let edge = Edge::new(NodeId::new(), NodeId::new())
        .with_condition("variables.x > 3")
        .with_max_iterations(3);
    assert_eq!(edge.condition.as_deref(), Some("variables.x > 3"));
    assert_eq!(edge.max_iterations, Some(3));
}

#[test]
fn workflow_serde_round_trips() {
    let (wf, ..) = linear_workflow();
    let json = serde_json::to_string(&wf).unwrap();
    let back: Workflow = serde_json::from_str(&json).unwrap();
    assert_eq!(back.nodes.len(), 3);
    assert_eq!(back.edges.len(), 2);
}
