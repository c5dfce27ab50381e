//! End-to-end walks over scratch git repositories.

use bictrace::{
    BlameOptions, BlameProvider, CancelFlag, ChainWalker, ChangeClassification, DecisionOracle,
    GitRepository, MapperRegistry, OracleContext, OracleDecision, Seed, TerminalState, TraceConfig,
    TraceRunner,
};
use git2::{Oid, Repository, Signature};
use tempfile::TempDir;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct ScratchRepo {
    dir: TempDir,
    repo: Repository,
}

impl ScratchRepo {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Repository::init(dir.path()).expect("init repo");
        Self { dir, repo }
    }

    /// Write `content` to `path` and commit it, returning the commit OID.
    fn commit_file(&self, path: &str, content: &str, message: &str) -> Oid {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(&full, content).expect("write file");

        let mut index = self.repo.index().expect("index");
        index.add_path(std::path::Path::new(path)).expect("add");
        index.write().expect("index write");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");

        let sig = Signature::now("tester", "tester@example.com").expect("signature");
        let parents: Vec<git2::Commit> = self
            .repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .expect("commit")
    }

    fn open(&self) -> GitRepository {
        GitRepository::open(self.dir.path()).expect("open")
    }
}

fn assert_monotonic(repo: &ScratchRepo, trace: &bictrace::SeedTrace) {
    for pair in trace.chain.steps.windows(2) {
        let newer = Oid::from_str(&pair[0].revision).expect("oid");
        let older = Oid::from_str(&pair[1].revision).expect("oid");
        assert_ne!(newer, older, "steps must advance");
        assert!(
            repo.repo.graph_descendant_of(newer, older).expect("graph"),
            "step {} must be a strict ancestor of step {}",
            older,
            newer
        );
    }
}

#[test]
fn root_commit_forces_insert() {
    init_logging();
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file("src/app.c", "int main() {\n  leak();\n  return 0;\n}\n", "initial");
    let fix = scratch.commit_file(
        "src/app.c",
        "int main() {\n  free_all();\n  return 0;\n}\n",
        "fix leak",
    );

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(
        &fix.to_string(),
        &Seed::new("src/app.c", 2),
        &CancelFlag::new(),
    );

    assert_eq!(trace.terminal, TerminalState::Introduced);
    let bic = trace.bic().expect("bic");
    assert_eq!(bic.revision, c1.to_string());
    assert_eq!(bic.classification, ChangeClassification::Insert);
    assert_eq!(bic.confidence, 1.0);
}

#[test]
fn walk_through_an_edit_reaches_the_introducing_commit() {
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file(
        "calc.c",
        "int total;\nint x = compute(a, b);\nreturn x;\n",
        "introduce compute",
    );
    let c2 = scratch.commit_file(
        "calc.c",
        "int total;\nint x = compute(a, b, c);\nreturn x;\n",
        "extend compute",
    );
    let fix = scratch.commit_file(
        "calc.c",
        "int total;\nint x = compute_checked(a, b, c);\nreturn x;\n",
        "fix overflow",
    );

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(&fix.to_string(), &Seed::new("calc.c", 2), &CancelFlag::new());

    assert_eq!(trace.terminal, TerminalState::Introduced);
    assert_monotonic(&scratch, &trace);

    // Head of the chain: the edit in c2, mapped onto c1 by similarity.
    assert_eq!(trace.chain.steps[0].revision, c2.to_string());
    // Tail: the root commit, forced Insert.
    let bic = trace.bic().expect("bic");
    assert_eq!(bic.revision, c1.to_string());
}

#[test]
fn line_in_a_new_file_is_introduced_where_the_file_appeared() {
    let scratch = ScratchRepo::new();
    scratch.commit_file("README", "docs\n", "initial");
    let adds = scratch.commit_file("util.c", "void helper() {\n  risky();\n}\n", "add util");
    let fix = scratch.commit_file("util.c", "void helper() {\n  safe();\n}\n", "fix util");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(&fix.to_string(), &Seed::new("util.c", 2), &CancelFlag::new());

    assert_eq!(trace.terminal, TerminalState::Introduced);
    let bic = trace.bic().expect("bic");
    assert_eq!(bic.revision, adds.to_string());
    // Insert because the file has no counterpart in the parent.
    assert_eq!(bic.confidence, 0.9);
}

#[test]
fn depth_cap_terminates_long_histories_as_depth_limited() {
    let scratch = ScratchRepo::new();
    // Every commit rewrites the same line with a high-similarity variant,
    // so each hop classifies Update and keeps walking.
    let mut content = String::from("value = compute(seed);\n");
    scratch.commit_file("loop.c", &content, "c0");
    for i in 1..8 {
        content = format!("value = compute(seed{});\n", "x".repeat(i));
        scratch.commit_file("loop.c", &content, &format!("c{i}"));
    }
    let fix = scratch.commit_file("loop.c", "value = guarded(seed);\n", "fix");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig {
        max_depth: 3,
        ..TraceConfig::default()
    };
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(&fix.to_string(), &Seed::new("loop.c", 1), &CancelFlag::new());

    assert_eq!(
        trace.terminal,
        TerminalState::Boundary { depth_limited: true }
    );
    assert_eq!(trace.chain.len(), 3);
    assert_monotonic(&scratch, &trace);
}

#[test]
fn absent_file_is_a_boundary_not_an_error() {
    let scratch = ScratchRepo::new();
    scratch.commit_file("a.c", "one\n", "initial");
    let fix = scratch.commit_file("a.c", "two\n", "fix");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(
        &fix.to_string(),
        &Seed::new("missing.c", 1),
        &CancelFlag::new(),
    );

    assert_eq!(
        trace.terminal,
        TerminalState::Boundary { depth_limited: false }
    );
    assert!(trace.chain.is_empty());
    assert!(trace.bic().is_none());
}

/// Overwrite a loose object with garbage so reads of it fail with a real
/// object-store fault rather than a missing path.
fn corrupt_loose_object(workdir: &std::path::Path, oid: Oid) {
    let hex = oid.to_string();
    let path = workdir
        .join(".git/objects")
        .join(&hex[..2])
        .join(&hex[2..]);
    let mut perms = std::fs::metadata(&path)
        .expect("object metadata")
        .permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(&path, perms).expect("chmod object");
    std::fs::write(&path, b"not a zlib stream").expect("corrupt object");
}

#[test]
fn persistent_blame_fault_aborts_the_seed_as_an_error() {
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file("data.c", "compute();\n", "initial");
    let fix = scratch.commit_file("data.c", "compute_fixed();\n", "fix");

    let blob_id = {
        let commit = scratch.repo.find_commit(c1).expect("commit");
        let tree = commit.tree().expect("tree");
        tree.get_path(std::path::Path::new("data.c"))
            .expect("entry")
            .id()
    };
    corrupt_loose_object(scratch.dir.path(), blob_id);

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(&fix.to_string(), &Seed::new("data.c", 1), &CancelFlag::new());

    // A broken lookup is not a history boundary.
    assert!(matches!(trace.terminal, TerminalState::Error { .. }));
    assert!(trace.chain.is_empty());
}

#[test]
fn blame_hops_over_ignored_revisions() {
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file("fmt.c", "int x=1;\n", "initial");
    let reformat = scratch.commit_file("fmt.c", "int x = 1;\n", "reformat");

    let repo = scratch.open();
    let provider = BlameProvider::new(&repo);

    let mut options = BlameOptions::default();
    options.ignore_revisions.insert(reformat.to_string());

    let lines = provider
        .blame(&reformat.to_string(), "fmt.c", &[1], &options)
        .expect("blame");

    // Attribution skips the reformat commit and lands on the commit that
    // wrote the line, with the line's content there.
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].revision.oid, c1.to_string());
    assert_eq!(lines[0].line_content, "int x=1;");
}

#[test]
fn ignored_root_commit_yields_no_attribution() {
    let scratch = ScratchRepo::new();
    let root = scratch.commit_file("solo.c", "only();\n", "initial");

    let repo = scratch.open();
    let provider = BlameProvider::new(&repo);

    let mut options = BlameOptions::default();
    options.ignore_revisions.insert(root.to_string());

    let lines = provider
        .blame(&root.to_string(), "solo.c", &[1], &options)
        .expect("blame");

    assert!(lines.is_empty());
}

#[test]
fn cancelled_walk_keeps_its_partial_chain() {
    let scratch = ScratchRepo::new();
    scratch.commit_file("a.c", "line\n", "initial");
    let fix = scratch.commit_file("a.c", "other\n", "fix");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let trace = walker.trace(&fix.to_string(), &Seed::new("a.c", 1), &cancel);

    assert_eq!(
        trace.terminal,
        TerminalState::Boundary { depth_limited: false }
    );
    assert!(trace.chain.is_empty());
}

#[test]
fn rerunning_a_trace_yields_an_identical_chain() {
    let scratch = ScratchRepo::new();
    scratch.commit_file("x.c", "alpha();\nbeta();\n", "initial");
    scratch.commit_file("x.c", "alpha();\nbeta(arg);\n", "change beta");
    let fix = scratch.commit_file("x.c", "alpha();\nbeta_fixed(arg);\n", "fix beta");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let first = walker.trace(&fix.to_string(), &Seed::new("x.c", 2), &CancelFlag::new());
    let second = walker.trace(&fix.to_string(), &Seed::new("x.c", 2), &CancelFlag::new());

    let a = serde_json::to_string(&first).expect("serialize");
    let b = serde_json::to_string(&second).expect("serialize");
    assert_eq!(a, b);
}

#[test]
fn runner_aggregates_seeds_sharing_one_introducing_commit() {
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file("m.c", "first();\nsecond();\nthird();\n", "initial");
    let fix = scratch.commit_file(
        "m.c",
        "first_fixed();\nsecond();\nthird_fixed();\n",
        "fix both",
    );

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let runner = TraceRunner::new(&repo, &mappers, &config);

    let seeds = vec![Seed::new("m.c", 1), Seed::new("m.c", 3)];
    let result = runner.trace_fix_commit(&fix.to_string(), &seeds, &CancelFlag::new());

    assert_eq!(result.traces.len(), 2);
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].revision, c1.to_string());
    assert_eq!(result.candidates[0].supporting_traces.len(), 2);
}

#[test]
fn oracle_override_turns_an_unknown_step_into_the_bic() {
    struct InsertOracle;
    impl DecisionOracle for InsertOracle {
        fn decide(&self, _ctx: &OracleContext<'_>) -> anyhow::Result<OracleDecision> {
            Ok(OracleDecision {
                accept_classification: false,
                override_classification: Some(ChangeClassification::Insert),
                override_parent_line: None,
                continue_tracking: false,
                confidence: 0.9,
            })
        }
    }

    let scratch = ScratchRepo::new();
    scratch.commit_file("doc.c", "code();\n", "initial");
    // Comment-only target lines map to Unknown, which routes to the
    // oracle.
    let edits = scratch.commit_file("doc.c", "code();\n// deprecated path\n", "annotate");
    let fix = scratch.commit_file("doc.c", "code();\n// removed path\n", "fix annotation");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let oracle = InsertOracle;
    let walker = ChainWalker::new(&repo, &mappers, &config).with_oracle(&oracle);

    let trace = walker.trace(&fix.to_string(), &Seed::new("doc.c", 2), &CancelFlag::new());

    assert_eq!(trace.terminal, TerminalState::Introduced);
    let bic = trace.bic().expect("bic");
    assert_eq!(bic.revision, edits.to_string());
    assert_eq!(bic.classification, ChangeClassification::Insert);
}

#[test]
fn no_oracle_fallback_keeps_walking_on_unknown() {
    let scratch = ScratchRepo::new();
    let c1 = scratch.commit_file("n.c", "work();\n// note\n", "initial");
    let c2 = scratch.commit_file("n.c", "work();\n// note, revised\n", "revise note");
    let fix = scratch.commit_file("n.c", "work();\n// note, final\n", "fix note");

    let repo = scratch.open();
    let mappers = MapperRegistry::new(&repo);
    let config = TraceConfig::default();
    let walker = ChainWalker::new(&repo, &mappers, &config);

    let trace = walker.trace(&fix.to_string(), &Seed::new("n.c", 2), &CancelFlag::new());

    // The unknown step at c2 is treated as Update with the line kept,
    // and the walk continues to the root.
    assert_eq!(trace.terminal, TerminalState::Introduced);
    assert_eq!(trace.chain.steps[0].revision, c2.to_string());
    assert_eq!(
        trace.chain.steps[0].classification,
        ChangeClassification::Update
    );
    assert_eq!(trace.bic().expect("bic").revision, c1.to_string());
    assert_monotonic(&scratch, &trace);
}
