//! Save, clear and load against the in-memory audio server.

use fx_core::parse_enumeration;
use fx_jack::{clear, load, save, JackTools, MemoryJack, PatchbayError};

fn rack() -> MemoryJack {
    MemoryJack::default()
        .output("system:capture_1", "mic_l")
        .output("system:capture_2", "mic_r")
        .input("system:playback_1", "out_l")
        .input("system:playback_2", "out_r")
        .input("reverb:in", "fx_in")
        .output("reverb:out", "fx_out")
}

fn wire(jack: &MemoryJack) {
    jack.connect("system:capture_1", "reverb:in").unwrap();
    jack.connect("system:capture_2", "reverb:in").unwrap();
    jack.connect("reverb:out", "system:playback_1").unwrap();
    jack.connect("reverb:out", "system:playback_2").unwrap();
}

#[test]
fn test_save_load_save_keeps_connection_set() {
    let jack = rack();
    wire(&jack);

    let first = save(&jack).unwrap();
    let json = first.to_json().unwrap();

    let report = load(&jack, &json, true).unwrap();
    assert!(report.is_clean(), "failures: {:?}", report.failures);

    let second = save(&jack).unwrap();
    assert_eq!(
        first.to_graph().connection_set(),
        second.to_graph().connection_set()
    );
}

#[test]
fn test_saved_links_run_from_output_to_input() {
    let jack = rack();
    wire(&jack);

    let doc = save(&jack).unwrap();
    let mut links: Vec<(&str, &str)> = doc
        .graph
        .iter()
        .map(|(s, d)| (s.as_str(), d.as_str()))
        .collect();
    links.sort();
    assert_eq!(
        links,
        vec![
            ("fx_out", "out_l"),
            ("fx_out", "out_r"),
            ("mic_l", "fx_in"),
            ("mic_r", "fx_in"),
        ]
    );
}

#[test]
fn test_clear_then_load_reproduces_saved_graph_only() {
    let jack = rack();
    wire(&jack);
    let saved = save(&jack).unwrap().to_json().unwrap();

    // Extra link made after the save must not survive.
    jack.connect("mic_l", "out_l").unwrap();

    let cleared = clear(&jack).unwrap();
    assert_eq!(cleared.attempted, 5);
    assert!(jack.links().is_empty());

    let report = load(&jack, &saved, false).unwrap();
    assert_eq!(report.attempted, 4);
    assert!(report.is_clean());

    let after = save(&jack).unwrap().to_graph().connection_set();
    let expected = fx_protocol::PatchbayDocument::parse(&saved)
        .unwrap()
        .to_graph()
        .connection_set();
    assert_eq!(after, expected);
}

#[test]
fn test_load_with_clear_replaces_live_graph() {
    let jack = rack();
    jack.connect("mic_l", "out_l").unwrap();

    let input = r#"{"ports":["mic_r","out_r"],"graph":[["mic_r","out_r"]]}"#;
    let report = load(&jack, input, true).unwrap();

    assert_eq!(report.attempted, 2);
    assert!(report.is_clean());
    assert_eq!(
        jack.links(),
        vec![("system:capture_2".to_string(), "system:playback_2".to_string())]
    );
}

#[test]
fn test_rejected_document_leaves_graph_untouched() {
    let jack = rack();
    wire(&jack);
    let before = jack.links();

    for input in [
        "",
        "{\"ports\": [\"mic_l\"], \"graph\": [[\"mic_l\"]]}",
        "{\"ports\": [], \"graph\": [], \"extra\": 1}",
        "{\"ports\": [\"mic_l\"], \"graph\": [[\"mic_l\", \"out_l\"]]}",
        "__import__('os').system('true')",
    ] {
        let err = load(&jack, input, true).unwrap_err();
        assert!(matches!(err, PatchbayError::Format(_)), "{input}: {err}");
        assert_eq!(jack.links(), before);
    }
}

#[test]
fn test_enumeration_example() {
    let text = "system:capture_1\n   portA\n   system:playback_1\nsystem:playback_1\n   portB\n";
    let parsed = parse_enumeration(text).unwrap();

    let ports: Vec<&str> = parsed.graph.ports().iter().map(|a| a.as_str()).collect();
    assert_eq!(ports, vec!["portA", "portB"]);

    let links: Vec<(&str, &str)> = parsed
        .graph
        .connections()
        .iter()
        .map(|c| (c.source.as_str(), c.destination.as_str()))
        .collect();
    assert_eq!(links, vec![("portA", "portB")]);
}

#[test]
fn test_failed_connect_does_not_stop_batch() {
    let jack = rack();
    jack.connect("mic_l", "out_l").unwrap();

    let input = r#"{"ports":["mic_l","out_l","mic_r","out_r"],"graph":[["mic_l","out_l"],["mic_r","out_r"]]}"#;
    let report = load(&jack, input, false).unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, "mic_l");
    assert_eq!(jack.links().len(), 2);
}
