//! DRC report classification tests using `kicad-cli pcb drc --format json`
//! style output.

use kicad_pcb_mcp::kicad::DrcReport;

const REPORT: &str = r#"{
    "$schema": "https://schemas.kicad.org/drc.v1.json",
    "coordinate_units": "mm",
    "date": "2024-05-01T10:00:00+0000",
    "kicad_version": "8.0.2",
    "source": "sample.kicad_pcb",
    "violations": [
        {
            "type": "clearance",
            "severity": "error",
            "description": "Clearance violation (netclass 'Default' clearance 0.2000 mm; actual 0.1200 mm)",
            "pos": { "x": 30.0, "y": 25.0 },
            "items": [
                { "description": "Via [GND] on F.Cu - B.Cu", "pos": { "x": 30.0, "y": 25.0 }, "uuid": "via-gnd-1" },
                { "description": "Track [/SIG] on F.Cu, length 6.0000 mm", "pos": { "x": 30.1, "y": 22.0 }, "uuid": "seg-sig" }
            ]
        },
        {
            "type": "silk_overlap",
            "severity": "warning",
            "description": "Silkscreen overlap",
            "items": [ { "description": "Reference field of R1" } ]
        },
        {
            "type": "lib_footprint_mismatch",
            "severity": "ignore",
            "description": "Footprint doesn't match copy in library"
        }
    ],
    "unconnected_items": [
        {
            "description": "Missing connection between items",
            "items": [
                { "description": "Pad 2 [/LED] of R1 on F.Cu" },
                { "description": "Pad 1 [/LED] of D1 on F.Cu" }
            ]
        }
    ],
    "schematic_parity": []
}"#;

#[test]
fn test_report_counts_by_severity() {
    let report = DrcReport::from_json(REPORT).expect("report should parse");
    let result = report.classify("", Some("/tmp/sample-drc.json"));

    assert!(!result.passed);
    assert_eq!(result.error_count, 2);
    assert_eq!(result.warning_count, 1);
    assert_eq!(result.violations.len(), 4);
    assert_eq!(result.report_path.as_deref(), Some("/tmp/sample-drc.json"));
}

#[test]
fn test_violation_details_are_carried() {
    let report = DrcReport::from_json(REPORT).expect("report should parse");
    let result = report.classify("", None);

    let clearance = &result.violations[0];
    assert_eq!(clearance.kind, "clearance");
    assert_eq!(clearance.severity, "error");
    assert_eq!(clearance.items.len(), 2);
    let pos = clearance.position.expect("clearance violation has a position");
    assert!((pos.x - 30.0).abs() < 1e-9 && (pos.y - 25.0).abs() < 1e-9);

    let unconnected = result.violations.last().expect("unconnected entry");
    assert_eq!(unconnected.kind, "unconnected_items");
    assert_eq!(unconnected.severity, "error");
    assert_eq!(unconnected.items[1], "Pad 1 [/LED] of D1 on F.Cu");
}

#[test]
fn test_clean_report_passes_with_diagnostics() {
    let report = DrcReport::from_json(r#"{ "violations": [], "unconnected_items": [] }"#)
        .expect("report should parse");
    let result = report.classify("  Found 0 DRC violations\n", None);

    assert!(result.passed);
    assert_eq!(result.error_count, 0);
    assert!(result.violations.is_empty());
    assert_eq!(result.message, "Found 0 DRC violations");
}

#[test]
fn test_warnings_alone_still_pass() {
    let report = DrcReport::from_json(
        r#"{ "violations": [ { "type": "silk_over_copper", "severity": "warning", "description": "Silk over copper" } ] }"#,
    )
    .expect("report should parse");
    let result = report.classify("", None);

    assert!(result.passed);
    assert_eq!(result.warning_count, 1);
    assert_eq!(result.violations.len(), 1);
}

#[test]
fn test_result_serialises_type_field() {
    let report = DrcReport::from_json(REPORT).expect("report should parse");
    let value = serde_json::to_value(report.classify("", None)).expect("serialisable");

    assert_eq!(value["violations"][0]["type"], "clearance");
    assert_eq!(value["error_count"], 2);
    assert!(value.get("message").is_none());
}

#[test]
fn test_malformed_report_is_an_error() {
    assert!(DrcReport::from_json("{ not json").is_err());
}
