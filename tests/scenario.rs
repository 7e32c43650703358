use std::fs;
use std::time::Duration;

use unclone::construct::Construct;
use unclone::dedup::{
    self, codegen, parameters, AnalysisOptions, InferredType, ParameterOrigin, SimilarityConfig,
    SimilarityContext,
};
use unclone::language::Language;
use unclone::search::WalkSearch;

const GREET_USER: &str = "def greet_user():\n    message = \"Hello, \" + current()\n    log(message)\n    return message";
const GREET_ADMIN: &str = "def greet_admin():\n    text = \"Welcome, \" + current()\n    log(text)\n    return text";

fn options() -> AnalysisOptions {
    AnalysisOptions {
        languages: vec![Language::Python],
        min_similarity: 0.8,
        min_lines: 3,
        ..Default::default()
    }
}

#[test]
fn literal_only_duplicates_become_one_parameterized_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greet.py");
    let content = format!("{}\n\n\n{}\n", GREET_USER, GREET_ADMIN);
    fs::write(&path, &content).unwrap();

    let search = WalkSearch::new(Duration::from_secs(30));
    let ctx = SimilarityContext::new(SimilarityConfig::default());
    let report = dedup::analyze_path(dir.path(), &options(), &search, &ctx).unwrap();

    assert_eq!(report.summary.total_constructs, 2);
    assert_eq!(report.summary.duplicate_groups, 1);
    let candidate = &report.candidates[0];
    assert_eq!(candidate.group.instances.len(), 2);
    assert!(candidate.similarity >= 0.8);

    assert_eq!(candidate.parameters.len(), 1);
    let param = &candidate.parameters[0];
    assert_eq!(param.inferred_type, InferredType::String);
    assert_eq!(param.origin, ParameterOrigin::Literal);

    let code = &candidate.plan.generated_code;
    let new = &code.replacements[&path].new_content;
    assert!(new.contains("greet(\"Hello, \")"), "{}", new);
    assert!(new.contains("greet(\"Welcome, \")"), "{}", new);
    assert_eq!(code.function_name, "greet");

    // Nothing is written during analysis.
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn library_pipeline_matches_cli_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    let b = dir.path().join("b.py");
    fs::write(&a, format!("{}\n", GREET_USER)).unwrap();
    fs::write(&b, format!("{}\n", GREET_ADMIN)).unwrap();

    let first = Construct::new(Language::Python, &a, (1, 0), (4, 0), GREET_USER);
    let second = Construct::new(Language::Python, &b, (1, 0), (4, 0), GREET_ADMIN);
    let ctx = SimilarityContext::new(SimilarityConfig::default());

    let groups = dedup::group(&[first, second], 0.8, 3, &ctx).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].instances.len(), 2);

    let params = parameters::infer(&groups[0]);
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].inferred_type, InferredType::String);

    let plan = codegen::generate(&groups[0], &params, Language::Python).unwrap();
    assert_eq!(plan.files_affected.len(), 2);
    assert!(plan.generated_code.extract_to_file.is_some());
    assert!(plan.generated_code.extracted_function.starts_with("def greet("));
}

#[test]
fn unrelated_code_produces_no_groups() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("mixed.py"),
        "def total(items):\n    count = 0\n    for item in items:\n        count += item.price\n    return count\n\n\nclass Settings:\n    debug = False\n    verbose = True\n    name = \"app\"\n",
    )
    .unwrap();

    let search = WalkSearch::new(Duration::from_secs(30));
    let ctx = SimilarityContext::new(SimilarityConfig::default());
    let report = dedup::analyze_path(dir.path(), &options(), &search, &ctx).unwrap();
    assert_eq!(report.summary.duplicate_groups, 0);
    assert!(report.candidates.is_empty());
    assert!(report.recommendations.is_empty());
}
