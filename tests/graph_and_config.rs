//! Integration tests for graph compilation (fail-fast validation) and the
//! training configuration types.

use labelmodel::{
    Dependency, DependencyKind, FactorGraph, GraphSpec, LabelMatrix, ModelError, RegType,
    TrainConfig,
};

fn votes() -> LabelMatrix {
    let mut l = LabelMatrix::new(4, 3);
    l.set(0, 0, 1);
    l.set(0, 1, 2);
    l.set(1, 0, 2);
    l.set(2, 2, 1);
    l.set(3, 1, 1);
    l
}

// ---------------------------------------------------------------------------
// Graph compilation
// ---------------------------------------------------------------------------

#[test]
fn compile_accepts_well_formed_input() {
    let spec = GraphSpec {
        dependencies: vec![
            Dependency::new(0, 1, DependencyKind::Similar),
            Dependency::new(1, 0, DependencyKind::Fixing),
            Dependency::new(1, 2, DependencyKind::Exclusive),
        ],
        supervised: Some(vec![0, 2, 0, 1]),
        acc_prior_weights: Some(vec![0.5, 0.5, 0.5]),
        candidate_ranges: None,
    };
    let graph = FactorGraph::compile(&votes(), 2, &spec).unwrap();
    assert_eq!(graph.n_candidates(), 4);
    assert_eq!(graph.n_lfs(), 3);
    assert_eq!(graph.dependencies().len(), 3);
    assert_eq!(graph.observed(1), Some(2));
    assert_eq!(graph.observed(0), None);
    assert_eq!(graph.supervised_fraction(), Some(0.5));
}

#[test]
fn compile_rejects_cardinality_below_two() {
    for cardinality in [0usize, 1] {
        let err = FactorGraph::compile(&votes(), cardinality, &GraphSpec::default());
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }
}

#[test]
fn compile_rejects_dependency_index_out_of_range() {
    let spec = GraphSpec {
        dependencies: vec![Dependency::new(0, 3, DependencyKind::Similar)],
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn compile_rejects_self_dependency() {
    let spec = GraphSpec {
        dependencies: vec![Dependency::new(1, 1, DependencyKind::Reinforcing)],
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn compile_rejects_duplicate_pair_declarations() {
    // same ordered pair twice, even with the same kind
    let spec = GraphSpec {
        dependencies: vec![
            Dependency::new(0, 1, DependencyKind::Similar),
            Dependency::new(0, 1, DependencyKind::Similar),
        ],
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn compile_rejects_supervised_length_mismatch() {
    let spec = GraphSpec {
        supervised: Some(vec![0, 1]),
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn compile_rejects_supervised_label_above_cardinality() {
    let spec = GraphSpec {
        supervised: Some(vec![0, 0, 3, 0]),
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn compile_rejects_malformed_ranges() {
    let base = GraphSpec::default();
    // wrong length
    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![1, 2]]),
        ..base.clone()
    };
    assert!(FactorGraph::compile(&votes(), 2, &spec).is_err());
    // empty range
    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![1, 2], vec![], vec![1, 2], vec![1, 2]]),
        ..base.clone()
    };
    assert!(FactorGraph::compile(&votes(), 2, &spec).is_err());
    // zero is not a class label
    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![0, 1]; 4]),
        ..base.clone()
    };
    assert!(FactorGraph::compile(&votes(), 2, &spec).is_err());
    // duplicate values
    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![1, 1]; 4]),
        ..base
    };
    assert!(FactorGraph::compile(&votes(), 2, &spec).is_err());
}

#[test]
fn compile_rejects_supervised_label_outside_range() {
    let spec = GraphSpec {
        supervised: Some(vec![0, 0, 0, 2]),
        candidate_ranges: Some(vec![vec![1, 2], vec![1, 2], vec![1, 2], vec![1]]),
        ..Default::default()
    };
    let err = FactorGraph::compile(&votes(), 2, &spec);
    assert!(matches!(err, Err(ModelError::Configuration(_))));
}

#[test]
fn scoped_domains_are_reported() {
    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![1, 2], vec![2, 3], vec![1, 2], vec![1, 2]]),
        ..Default::default()
    };
    let graph = FactorGraph::compile(&votes(), 3, &spec).unwrap();
    assert_eq!(graph.domain(1), &[2, 3]);
    assert_eq!(graph.uniform_domain_size(), Some(2));

    let spec = GraphSpec {
        candidate_ranges: Some(vec![vec![1, 2, 3], vec![2, 3], vec![1, 2], vec![1, 2]]),
        ..Default::default()
    };
    let graph = FactorGraph::compile(&votes(), 3, &spec).unwrap();
    assert_eq!(graph.uniform_domain_size(), None);
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[test]
fn reg_type_parses_case_insensitively() {
    assert_eq!("L2".parse::<RegType>().unwrap(), RegType::L2);
    assert_eq!("l1".parse::<RegType>().unwrap(), RegType::L1);
    assert_eq!("NONE".parse::<RegType>().unwrap(), RegType::None);
    assert!("elastic".parse::<RegType>().is_err());
}

#[test]
fn train_config_round_trips_json() {
    let cfg = TrainConfig::default().with_reg(RegType::L1, 0.5).with_seed(17);
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("reg_param"));
    let back: TrainConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.reg_type, RegType::L1);
    assert!((back.reg_param - 0.5).abs() < 1e-12);
    assert_eq!(back.seed, 17);
    assert_eq!(back.epochs, cfg.epochs);
}
