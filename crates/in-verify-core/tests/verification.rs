// End-to-end exercises of the full verification pipeline, covering the
// literal scenarios a signed layout/chain combination must satisfy.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use in_verify_core::config::VerifyConfig;
use in_verify_core::crypto::SignatureVerifier;
use in_verify_core::inspection::InspectionRunner;
use in_verify_core::loader::MemoryLinkLoader;
use in_verify_core::model::{
    ArtifactDigest, ArtifactSet, Inspection, Layout, Link, LinkKind, PublicKey, Signature, Step,
};
use in_verify_core::{orchestrator, VerifyError};

/// Accepts any signature; signature/key cryptography has its own coverage in
/// `crypto.rs` and isn't the concern under test here.
struct AlwaysValid;

impl SignatureVerifier for AlwaysValid {
    fn verify(&self, _message: &[u8], _signature: &Signature, _key: &PublicKey) -> bool {
        true
    }
}

/// Never invoked by the scenarios below (none declare inspections).
struct NoInspections;

impl InspectionRunner for NoInspections {
    fn run(&self, inspection: &Inspection, _base_dir: &std::path::Path) -> Result<Link, VerifyError> {
        panic!("unexpected inspection run: {}", inspection.name);
    }
}

fn digest(content: &str) -> ArtifactDigest {
    ArtifactDigest::from([("sha256".to_string(), format!("H({content})"))])
}

fn owner_key(keyid: &str) -> PublicKey {
    PublicKey {
        keyid: keyid.to_string(),
        key: vec![0u8; 32],
    }
}

fn signed(keyid: &str) -> Signature {
    Signature {
        keyid: keyid.to_string(),
        sig: vec![0u8; 64],
    }
}

fn layout(steps: Vec<Step>, keys: &[&str]) -> Layout {
    Layout {
        keys: keys.iter().map(|k| (k.to_string(), owner_key(k))).collect(),
        steps,
        inspect: vec![],
        expires: "2099-01-01T00:00:00Z".to_string(),
        signatures: keys.iter().map(|k| signed(k)).collect(),
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn run(
    layout: &Layout,
    links: MemoryLinkLoader,
) -> Result<orchestrator::VerificationReport, VerifyError> {
    let owner_keys: HashMap<String, PublicKey> =
        layout.keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let config = VerifyConfig::default();
    let dir = tempfile::tempdir().unwrap();
    orchestrator::verify(
        layout,
        &owner_keys,
        &links,
        &config,
        &AlwaysValid,
        &NoInspections,
        dir.path(),
        dir.path(),
        now(),
    )
}

/// Scenario 1: a single step with an ALLOW rule passes and the summary link
/// carries its products through untouched.
#[test]
fn simple_pass_through() {
    let build = Step {
        name: "build".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![],
        expected_products: vec![vec!["ALLOW".to_string(), "out.bin".to_string()]],
    };
    let layout = layout(vec![build], &["K"]);

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "build",
        "K",
        Link {
            products: ArtifactSet::from([("out.bin".to_string(), digest("x"))]),
            signatures: vec![signed("K")],
            ..Link::new("build", LinkKind::Link)
        },
    );

    let report = run(&layout, loader).unwrap();
    assert_eq!(
        report.summary.products.get("out.bin"),
        Some(&digest("x"))
    );
}

/// Scenario 2: MATCH across steps succeeds when materials mirror the prior
/// step's products, and fails closed when a digest is tampered with.
#[test]
fn match_across_steps() {
    let make_layout = || {
        let compile = Step {
            name: "compile".to_string(),
            expected_command: vec![],
            threshold: 1,
            pubkeys: vec!["K".to_string()],
            expected_materials: vec![],
            expected_products: vec![],
        };
        let package = Step {
            name: "package".to_string(),
            expected_command: vec![],
            threshold: 1,
            pubkeys: vec!["K".to_string()],
            expected_materials: vec![
                vec![
                    "MATCH".to_string(),
                    "*.o".to_string(),
                    "WITH".to_string(),
                    "PRODUCTS".to_string(),
                    "FROM".to_string(),
                    "compile".to_string(),
                ],
                vec!["DISALLOW".to_string(), "*".to_string()],
            ],
            expected_products: vec![],
        };
        layout(vec![compile, package], &["K"])
    };

    let compile_link = Link {
        products: ArtifactSet::from([
            ("a.o".to_string(), digest("1")),
            ("b.o".to_string(), digest("2")),
        ]),
        signatures: vec![signed("K")],
        ..Link::new("compile", LinkKind::Link)
    };

    let mut ok_loader = MemoryLinkLoader::new();
    ok_loader.insert("compile", "K", compile_link.clone());
    ok_loader.insert(
        "package",
        "K",
        Link {
            materials: ArtifactSet::from([
                ("a.o".to_string(), digest("1")),
                ("b.o".to_string(), digest("2")),
            ]),
            signatures: vec![signed("K")],
            ..Link::new("package", LinkKind::Link)
        },
    );
    assert!(run(&make_layout(), ok_loader).is_ok());

    let mut bad_loader = MemoryLinkLoader::new();
    bad_loader.insert("compile", "K", compile_link);
    bad_loader.insert(
        "package",
        "K",
        Link {
            materials: ArtifactSet::from([
                ("a.o".to_string(), digest("1")),
                ("b.o".to_string(), digest("TAMPERED")),
            ]),
            signatures: vec![signed("K")],
            ..Link::new("package", LinkKind::Link)
        },
    );
    let err = run(&make_layout(), bad_loader).unwrap_err();
    assert!(matches!(err, VerifyError::RuleVerification { .. }));
}

/// Scenario 4: two functionaries disagreeing on products fails the
/// threshold check even though both individually signed their links.
#[test]
fn threshold_disagreement_fails() {
    let sign = Step {
        name: "sign".to_string(),
        expected_command: vec![],
        threshold: 2,
        pubkeys: vec!["K1".to_string(), "K2".to_string()],
        expected_materials: vec![],
        expected_products: vec![],
    };
    let layout = layout(vec![sign], &["K1", "K2"]);

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "sign",
        "K1",
        Link {
            products: ArtifactSet::from([("release.tar".to_string(), digest("a"))]),
            signatures: vec![signed("K1")],
            ..Link::new("sign", LinkKind::Link)
        },
    );
    loader.insert(
        "sign",
        "K2",
        Link {
            products: ArtifactSet::from([("release.tar".to_string(), digest("b"))]),
            signatures: vec![signed("K2")],
            ..Link::new("sign", LinkKind::Link)
        },
    );

    let err = run(&layout, loader).unwrap_err();
    assert!(matches!(err, VerifyError::Threshold { .. }));
}

/// Scenario 5: CREATE on a path that already exists as a material is
/// rejected, since a create implies the path did not exist before.
#[test]
fn create_forbids_pre_existing_material() {
    let build = Step {
        name: "build".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![],
        expected_products: vec![vec!["CREATE".to_string(), "out.bin".to_string()]],
    };
    let layout = layout(vec![build], &["K"]);

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "build",
        "K",
        Link {
            materials: ArtifactSet::from([("out.bin".to_string(), digest("old"))]),
            products: ArtifactSet::from([("out.bin".to_string(), digest("old"))]),
            signatures: vec![signed("K")],
            ..Link::new("build", LinkKind::Link)
        },
    );

    let err = run(&layout, loader).unwrap_err();
    assert!(matches!(err, VerifyError::RuleVerification { .. }));
}

/// Scenario 3: a MATCH rule with source/destination prefixes rewrites the
/// queued path before comparing against the source step's products.
#[test]
fn prefix_rewriting_match() {
    let compile = Step {
        name: "compile".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![],
        expected_products: vec![],
    };
    let link_step = Step {
        name: "link".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![vec![
            "MATCH".to_string(),
            "lib*.a".to_string(),
            "IN".to_string(),
            "build/out".to_string(),
            "WITH".to_string(),
            "PRODUCTS".to_string(),
            "IN".to_string(),
            "dist".to_string(),
            "FROM".to_string(),
            "compile".to_string(),
        ]],
        expected_products: vec![],
    };
    let layout = layout(vec![compile, link_step], &["K"]);

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "compile",
        "K",
        Link {
            products: ArtifactSet::from([("dist/libz.a".to_string(), digest("z"))]),
            signatures: vec![signed("K")],
            ..Link::new("compile", LinkKind::Link)
        },
    );
    loader.insert(
        "link",
        "K",
        Link {
            materials: ArtifactSet::from([("build/out/libz.a".to_string(), digest("z"))]),
            signatures: vec![signed("K")],
            ..Link::new("link", LinkKind::Link)
        },
    );

    assert!(run(&layout, loader).is_ok());
}

/// Scenario 6: an inspection reporting a non-zero return value aborts
/// verification before any further rules are evaluated.
#[test]
fn inspection_bad_return_aborts() {
    struct FailingInspection;

    impl InspectionRunner for FailingInspection {
        fn run(&self, inspection: &Inspection, _base_dir: &std::path::Path) -> Result<Link, VerifyError> {
            Err(VerifyError::BadReturn {
                inspection: inspection.name.clone(),
                reason: "exit code 2".to_string(),
            })
        }
    }

    let build = Step {
        name: "build".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![],
        expected_products: vec![vec!["ALLOW".to_string(), "out.bin".to_string()]],
    };
    let mut layout = layout(vec![build], &["K"]);
    layout.inspect.push(Inspection {
        name: "check".to_string(),
        run: vec!["check.sh".to_string()],
        expected_materials: vec![],
        expected_products: vec![],
    });

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "build",
        "K",
        Link {
            products: ArtifactSet::from([("out.bin".to_string(), digest("x"))]),
            signatures: vec![signed("K")],
            ..Link::new("build", LinkKind::Link)
        },
    );

    let owner_keys: HashMap<String, PublicKey> =
        layout.keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let config = VerifyConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let err = orchestrator::verify(
        &layout,
        &owner_keys,
        &loader,
        &config,
        &AlwaysValid,
        &FailingInspection,
        dir.path(),
        dir.path(),
        now(),
    )
    .unwrap_err();

    assert!(matches!(err, VerifyError::BadReturn { .. }));
}

/// An unauthorized functionary's link is rejected even if well-formed and
/// signed, regardless of what the artifact rules say.
#[test]
fn unauthorized_functionary_rejected() {
    let build = Step {
        name: "build".to_string(),
        expected_command: vec![],
        threshold: 1,
        pubkeys: vec!["K".to_string()],
        expected_materials: vec![],
        expected_products: vec![vec!["ALLOW".to_string(), "out.bin".to_string()]],
    };
    let mut layout = layout(vec![build], &["K"]);
    layout.keys.insert("MALLORY".to_string(), owner_key("MALLORY"));

    let mut loader = MemoryLinkLoader::new();
    loader.insert(
        "build",
        "MALLORY",
        Link {
            products: ArtifactSet::from([("out.bin".to_string(), digest("x"))]),
            signatures: vec![signed("MALLORY")],
            ..Link::new("build", LinkKind::Link)
        },
    );

    // MALLORY never appears in step.pubkeys, so the loader finds nothing for
    // the authorized key and no link at all is available for the step.
    let err = run(&layout, loader).unwrap_err();
    assert!(matches!(err, VerifyError::RuleVerification { .. }));
}
