use pretty_assertions::assert_eq;
use std::io::Cursor;
use tempfile::NamedTempFile;
use uv_callback_tree::tree::calculate_metrics;
use uv_callback_tree::utils::{TraceEvent, TraceObserver};
use uv_callback_tree::{CallbackTraceTree, LoadError, NodeId, RecordError, TreeError};

/// Builder for one trace line with sensible defaults
struct Rec {
    name: &'static str,
    registrar: &'static str,
    level: i64,
    reg_id: i64,
    exec_id: i64,
    tree_number: i64,
    cb_type: &'static str,
    extra_info: &'static str,
    dependencies: &'static str,
}

impl Rec {
    fn new(name: &'static str, registrar: &'static str, level: i64, reg_id: i64, exec_id: i64) -> Self {
        Self {
            name,
            registrar,
            level,
            reg_id,
            exec_id,
            tree_number: 0,
            cb_type: "UV_TIMER_CB",
            extra_info: "",
            dependencies: "",
        }
    }

    fn cb_type(mut self, cb_type: &'static str) -> Self {
        self.cb_type = cb_type;
        self
    }

    fn extra_info(mut self, extra_info: &'static str) -> Self {
        self.extra_info = extra_info;
        self
    }

    fn depends_on(mut self, dependencies: &'static str) -> Self {
        self.dependencies = dependencies;
        self
    }

    fn tree_number(mut self, tree_number: i64) -> Self {
        self.tree_number = tree_number;
        self
    }

    /// Executed nodes run for `exec_id` microseconds starting at second `exec_id + 1`
    fn line(&self) -> String {
        let executed = self.exec_id >= 0;
        let (start, end) = if executed {
            (
                format!("{}s 0ns", self.exec_id + 1),
                format!("{}s {}ns", self.exec_id + 1, self.exec_id * 1000),
            )
        } else {
            ("0s 0ns".to_string(), "0s 0ns".to_string())
        };
        format!(
            "<name> <{name}> | <context> <0x10> | <context_type> <HANDLE> | <cb_type> <{cb_type}> | \
             <cb_behavior> <ACTION> | <tree_number> <{tree}> | <tree_level> <{level}> | \
             <level_entry> <0> | <exec_id> <{exec}> | <reg_id> <{reg}> | <callback_info> <0x20> | \
             <registrar> <{registrar}> | <tree_parent> <{registrar}> | <registration_time> <0s {reg}ns> | \
             <start_time> <{start}> | <end_time> <{end}> | <executing_thread> <1> | \
             <active> <0> | <finished> <{finished}> | <extra_info> <{extra}> | <dependencies> <{deps}>",
            name = self.name,
            cb_type = self.cb_type,
            tree = self.tree_number,
            level = self.level,
            exec = self.exec_id,
            reg = self.reg_id,
            registrar = self.registrar,
            start = start,
            end = end,
            finished = if executed { 1 } else { 0 },
            extra = self.extra_info,
            deps = self.dependencies,
        )
    }
}

fn load(records: &[Rec]) -> Result<CallbackTraceTree, LoadError> {
    CallbackTraceTree::from_lines(records.iter().map(Rec::line))
}

fn id(tree: &CallbackTraceTree, name: &str) -> NodeId {
    tree.node_by_name(name).unwrap()
}

fn names(tree: &CallbackTraceTree, ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|&i| tree.record(i).name.clone()).collect()
}

/// R registers A and C; A registers B; C registers D.
/// Registration order: R, A, C, B, D. Execution order: R, C, A, D, B.
fn sample_tree() -> CallbackTraceTree {
    load(&[
        Rec::new("R", "", 0, 0, 0).cb_type("INITIAL_STACK"),
        Rec::new("A", "R", 1, 1, 2),
        Rec::new("B", "A", 2, 3, 4).depends_on("C"),
        Rec::new("C", "R", 1, 2, 1),
        Rec::new("D", "C", 2, 4, 3).extra_info("non-user"),
    ])
    .unwrap()
}

#[test]
fn test_three_node_chain() {
    let tree = load(&[
        Rec::new("R", "", 0, 0, 0),
        Rec::new("A", "R", 1, 1, 1),
        Rec::new("B", "A", 2, 2, 2),
    ])
    .unwrap();

    let r = id(&tree, "R");
    assert_eq!(tree.root(), r);
    assert_eq!(names(&tree, &tree.execution_order()), vec!["R", "A", "B"]);

    let b = tree.record(id(&tree, "B"));
    let a = id(&tree, "A");
    assert!(tree.is_ancestor_of(r, b));
    assert!(!tree.is_ancestor_of(a, tree.record(r)));
}

#[test]
fn test_parent_and_children_links() {
    let tree = sample_tree();
    let r = id(&tree, "R");

    assert_eq!(tree.node(r).parent(), None);
    assert_eq!(names(&tree, tree.node(r).children()), vec!["A", "C"]);
    assert_eq!(tree.node(id(&tree, "B")).parent(), Some(id(&tree, "A")));
    assert_eq!(names(&tree, &tree.ancestors(id(&tree, "B"))), vec!["A", "R"]);
}

#[test]
fn test_multiple_roots_rejected() {
    let err = load(&[Rec::new("R1", "", 0, 0, 0), Rec::new("R2", "", 0, 1, 1)]).unwrap_err();
    match err {
        LoadError::Structure(TreeError::MultipleRoots { first, second }) => {
            assert_eq!(first, "R1");
            assert_eq!(second, "R2");
        }
        other => panic!("expected multiple roots, got {:?}", other),
    }
}

#[test]
fn test_no_records_means_no_root() {
    let err = CallbackTraceTree::from_lines(Vec::<String>::new()).unwrap_err();
    assert!(matches!(err, LoadError::Structure(TreeError::NoRoot)));
}

#[test]
fn test_duplicate_name_rejected() {
    let err = load(&[Rec::new("R", "", 0, 0, 0), Rec::new("R", "", 0, 1, 1)]).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Structure(TreeError::DuplicateName(ref name)) if name == "R"
    ));
}

#[test]
fn test_level_mismatch_rejected() {
    let err = load(&[Rec::new("R", "", 0, 0, 0), Rec::new("A", "R", 2, 1, 1)]).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Structure(TreeError::LevelMismatch { child_level: 2, parent_level: 0, .. })
    ));
}

#[test]
fn test_self_registration_rejected() {
    let err = load(&[Rec::new("R", "", 0, 0, 0), Rec::new("A", "A", 1, 1, 1)]).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Structure(TreeError::LevelMismatch { .. })
    ));
}

#[test]
fn test_tree_number_mismatch_rejected() {
    let err = load(&[
        Rec::new("R", "", 0, 0, 0),
        Rec::new("A", "R", 1, 1, 1).tree_number(1),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Structure(TreeError::TreeNumberMismatch { .. })
    ));
}

#[test]
fn test_unresolved_dependency_rejected() {
    let err = load(&[
        Rec::new("R", "", 0, 0, 0),
        Rec::new("A", "R", 1, 1, 1).depends_on("R ghost"),
    ])
    .unwrap_err();
    match err {
        LoadError::Structure(TreeError::UnresolvedDependency { name, dependency }) => {
            assert_eq!(name, "A");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("expected unresolved dependency, got {:?}", other),
    }
}

#[test]
fn test_dependencies_resolved_to_nodes() {
    let tree = sample_tree();
    let b = tree.node(id(&tree, "B"));
    assert_eq!(b.dependencies(), &[id(&tree, "C")]);
    assert_eq!(b.record().dependencies, vec!["C"]);
}

#[test]
fn test_record_error_reports_line_number() {
    let mut lines: Vec<String> = vec![Rec::new("R", "", 0, 0, 0).line(), String::new()];
    lines.push("<name> <broken>".to_string());

    match CallbackTraceTree::from_lines(lines).unwrap_err() {
        LoadError::Record { line, source } => {
            assert_eq!(line, 3);
            assert_eq!(source, RecordError::MissingField("context"));
        }
        other => panic!("expected record error, got {:?}", other),
    }
}

#[test]
fn test_time_regression_aborts_load() {
    let bad = Rec::new("A", "R", 1, 1, 1)
        .line()
        .replace("<start_time> <2s 0ns>", "<start_time> <0s 0ns>")
        .replace("<registration_time> <0s 1ns>", "<registration_time> <5s 0ns>");
    let lines = vec![Rec::new("R", "", 0, 0, 0).line(), bad];

    let err = CallbackTraceTree::from_lines(lines).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Record {
            line: 2,
            source: RecordError::NonMonotonicTime { .. }
        }
    ));
}

#[test]
fn test_from_reader_skips_blank_lines() {
    let text = format!(
        "{}\n\n{}\n",
        Rec::new("R", "", 0, 0, 0).line(),
        Rec::new("A", "R", 1, 1, 1).line()
    );
    let tree = CallbackTraceTree::from_reader(Cursor::new(text)).unwrap();
    assert_eq!(tree.len(), 2);
}

#[test]
fn test_from_path() {
    use std::io::Write;

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", Rec::new("R", "", 0, 0, 0).line()).unwrap();
    writeln!(file, "{}", Rec::new("A", "R", 1, 1, 1).line()).unwrap();

    let tree = CallbackTraceTree::from_path(file.path()).unwrap();
    assert_eq!(tree.len(), 2);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CallbackTraceTree::from_path(dir.path().join("missing.log")).unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}

#[test]
fn test_orders_differ_and_are_stable() {
    let tree = sample_tree();

    assert_eq!(
        names(&tree, &tree.registration_order()),
        vec!["R", "A", "C", "B", "D"]
    );
    assert_eq!(
        names(&tree, &tree.execution_order()),
        vec!["R", "C", "A", "D", "B"]
    );
    assert_eq!(tree.execution_order(), tree.execution_order());
    assert_eq!(tree.registration_order(), tree.registration_order());
}

#[test]
fn test_executed_schedule_skips_unexecuted() {
    let tree = load(&[
        Rec::new("R", "", 0, 0, 0),
        Rec::new("A", "R", 1, 1, 1),
        Rec::new("Pending", "R", 1, 2, -1),
    ])
    .unwrap();

    assert_eq!(
        names(&tree, &tree.execution_order()),
        vec!["Pending", "R", "A"]
    );
    assert_eq!(names(&tree, &tree.executed_schedule()), vec!["R", "A"]);
}

#[test]
fn test_lookup_by_ids() {
    let tree = sample_tree();

    assert_eq!(tree.node_by_registration_id(2), Some(id(&tree, "C")));
    assert_eq!(tree.node_by_execution_id(4), Some(id(&tree, "B")));
    assert_eq!(tree.node_by_registration_id(42), None);
    assert_eq!(tree.node_by_execution_id(-5), None);
    assert_eq!(tree.node_by_name("nope"), None);
}

#[test]
fn test_execution_predecessor() {
    let tree = sample_tree();

    assert_eq!(tree.execution_predecessor(id(&tree, "R")).unwrap(), None);
    assert_eq!(
        tree.execution_predecessor(id(&tree, "A")).unwrap(),
        Some(id(&tree, "C"))
    );
    assert_eq!(
        tree.execution_predecessor(id(&tree, "B")).unwrap(),
        Some(id(&tree, "D"))
    );
}

#[test]
fn test_execution_predecessor_of_first_node_is_contract_violation() {
    let tree = load(&[Rec::new("R", "", 0, 0, 3), Rec::new("A", "R", 1, 1, 4)]).unwrap();

    let err = tree.execution_predecessor(tree.root()).unwrap_err();
    assert_eq!(
        err,
        TreeError::NotInExecutionOrder {
            name: "R".to_string(),
            exec_id: 3
        }
    );
    assert_eq!(
        tree.execution_predecessor(id(&tree, "A")).unwrap(),
        Some(tree.root())
    );
}

#[test]
fn test_ancestry_is_irreflexive_and_transitive() {
    let tree = sample_tree();
    let (r, a, b) = (id(&tree, "R"), id(&tree, "A"), id(&tree, "B"));

    for &node in tree.nodes() {
        assert!(!tree.is_ancestor_of(node, tree.record(node)));
    }

    assert!(tree.is_ancestor_of(r, tree.record(a)));
    assert!(tree.is_ancestor_of(a, tree.record(b)));
    assert!(tree.is_ancestor_of(r, tree.record(b)));

    // siblings' subtrees are unrelated
    assert!(!tree.is_ancestor_of(id(&tree, "C"), tree.record(b)));
}

#[test]
fn test_ancestry_matches_by_registration_id() {
    let tree = sample_tree();
    let mut copy = tree.record(id(&tree, "B")).clone();
    copy.name = "not-in-tree".to_string();

    assert!(tree.is_ancestor_of(id(&tree, "A"), &copy));
}

#[test]
fn test_descendants() {
    let tree = sample_tree();

    assert_eq!(
        names(&tree, &tree.descendants(tree.root())),
        vec!["A", "B", "C", "D"]
    );
    assert_eq!(names(&tree, &tree.descendants(id(&tree, "C"))), vec!["D"]);
    assert!(tree.descendants(id(&tree, "B")).is_empty());
}

#[test]
fn test_walk_is_preorder() {
    let tree = sample_tree();

    let mut visited = Vec::new();
    tree.walk(None, |_, node| visited.push(node.name().to_string()));
    assert_eq!(visited, vec!["R", "A", "B", "C", "D"]);

    let mut from_c = Vec::new();
    tree.walk(Some(id(&tree, "C")), |_, node| from_c.push(node.name().to_string()));
    assert_eq!(from_c, vec!["C", "D"]);
}

#[test]
fn test_remove_orphans_descendants_without_cascading() {
    let mut tree = sample_tree();
    let (a, b) = (id(&tree, "A"), id(&tree, "B"));

    let detached = tree.remove(|record| record.name == "A");

    assert_eq!(detached, vec![a]);
    assert_eq!(names(&tree, tree.nodes()), vec!["R", "C", "D"]);
    assert_eq!(names(&tree, tree.node(tree.root()).children()), vec!["C"]);

    // A is cut loose, B still points at A and A still lists B
    assert_eq!(tree.node(a).parent(), None);
    assert_eq!(tree.node(b).parent(), Some(a));
    assert_eq!(tree.node(a).children(), &[b]);
    assert!(!tree.contains(a));
    assert!(!tree.contains(b));

    // pruned nodes vanish from lookups and orderings
    assert_eq!(tree.node_by_name("B"), None);
    assert_eq!(tree.node_by_execution_id(4), None);
    assert_eq!(names(&tree, &tree.execution_order()), vec!["R", "C", "D"]);
}

#[test]
fn test_remove_only_detaches_matching_nodes() {
    let mut tree = sample_tree();

    let detached = tree.remove(|record| !record.is_user_code());

    assert_eq!(names(&tree, &detached), vec!["D"]);
    for &node in &detached {
        assert!(!tree.record(node).is_user_code());
        assert!(!tree.contains(node));
    }
    for &node in tree.nodes() {
        assert!(tree.contains(node));
    }
}

#[test]
fn test_remove_never_detaches_root() {
    let mut tree = sample_tree();

    let detached = tree.remove(|record| record.name == "R");

    assert!(detached.is_empty());
    assert_eq!(tree.len(), 5);
    assert!(tree.contains(tree.root()));
}

#[test]
fn test_remove_nested_matches() {
    let mut tree = sample_tree();

    let detached = tree.remove(|record| record.tree_level >= 1);

    assert_eq!(names(&tree, &detached), vec!["A", "B", "C", "D"]);
    assert_eq!(names(&tree, tree.nodes()), vec!["R"]);
    assert!(tree.node(tree.root()).children().is_empty());
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl TraceObserver for Recorder {
    fn observe(&mut self, event: TraceEvent<'_>) {
        self.events.push(format!("{:?}", event));
    }
}

#[test]
fn test_observer_receives_structured_events() {
    let mut recorder = Recorder::default();
    let lines = vec![
        Rec::new("R", "", 0, 0, 0).line(),
        Rec::new("A", "R", 1, 1, 1).depends_on("R").line(),
    ];

    let mut tree = CallbackTraceTree::from_lines_observed(lines, &mut recorder).unwrap();
    tree.remove_observed(|record| record.name == "A", &mut recorder);

    assert_eq!(
        recorder.events,
        vec![
            r#"RecordParsed { line: 1, name: "R" }"#,
            r#"RecordParsed { line: 2, name: "A" }"#,
            r#"RootIdentified { name: "R" }"#,
            r#"ChildLinked { parent: "R", child: "A" }"#,
            r#"DependencyResolved { name: "A", dependency: "R" }"#,
            r#"TreeBuilt { nodes: 2, root: "R" }"#,
            r#"NodeDetached { name: "A" }"#,
            r#"PruneFinished { detached: 1, retained: 1 }"#,
        ]
    );
}

#[test]
fn test_metrics() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tree = load(&[
        Rec::new("R", "", 0, 0, 0).cb_type("INITIAL_STACK"),
        Rec::new("M", "R", 1, 1, 1).cb_type("MARKER_UV_RUN_BEGIN"),
        Rec::new("W", "M", 2, 2, 2).cb_type("UV_WORK_CB").extra_info("non-user"),
        Rec::new("T", "M", 2, 3, -1),
    ])
    .unwrap();

    let metrics = calculate_metrics(&tree);

    assert_eq!(metrics.total_nodes, 4);
    assert_eq!(metrics.executed_nodes, 3);
    assert_eq!(metrics.marker_nodes, 1);
    assert_eq!(metrics.user_nodes, 2);
    assert_eq!(metrics.threadpool_nodes, 1);
    assert_eq!(metrics.max_depth, 2);
    assert_eq!(metrics.by_type.get("UV_TIMER_CB"), Some(&1));
    // R runs [1s, 1s], M [2s, 2s+1us], W [3s, 3s+2us]
    assert_eq!(metrics.execution_span_ns, 2_000_002_000);
    assert_eq!(metrics.total_callback_ns, 2_000);
}

#[test]
fn test_invalid_utf8_is_a_record_error() {
    let mut bytes = Rec::new("R", "", 0, 0, 0).line().into_bytes();
    bytes.push(b'\n');
    let second = Rec::new("A", "R", 1, 1, 1).line();
    let offset = second.find("<0x20>").unwrap() + 1;
    let mut second = second.into_bytes();
    second.insert(offset, 0xff);
    bytes.extend_from_slice(&second);

    match CallbackTraceTree::from_reader(Cursor::new(bytes)).unwrap_err() {
        LoadError::Record { line, source } => {
            assert_eq!(line, 2);
            assert_eq!(source, RecordError::InvalidUtf8 { offset });
        }
        other => panic!("expected record error, got {:?}", other),
    }
}

#[test]
fn test_crlf_lines_load() {
    let text = format!(
        "{}\r\n{}\r\n",
        Rec::new("R", "", 0, 0, 0).line(),
        Rec::new("A", "R", 1, 1, 1).line()
    );
    let tree = CallbackTraceTree::from_reader(Cursor::new(text)).unwrap();
    assert_eq!(tree.len(), 2);
}

/// Reader whose underlying source always fails
struct BrokenSource;

impl std::io::Read for BrokenSource {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"))
    }
}

#[test]
fn test_read_failure_is_io_error() {
    let err = CallbackTraceTree::from_reader(std::io::BufReader::new(BrokenSource)).unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}

#[test]
fn test_get_rejects_foreign_ids() {
    let small = load(&[Rec::new("R", "", 0, 0, 0)]).unwrap();
    let large = sample_tree();
    let foreign = id(&large, "D");

    assert!(small.get(foreign).is_none());
    assert_eq!(small.get(small.root()).map(|node| node.name()), Some("R"));
}

#[test]
#[should_panic]
fn test_node_panics_on_foreign_id() {
    let small = load(&[Rec::new("R", "", 0, 0, 0)]).unwrap();
    let large = sample_tree();
    small.node(id(&large, "D"));
}
