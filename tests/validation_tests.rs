//! Validation of delimited-file batches against a YAML schema file

use std::fs;
use std::path::Path;

use period_ingest::bundle::DisabledFetcher;
use period_ingest::config::LoaderConfig;
use period_ingest::error::LoadError;
use period_ingest::orchestrator::LoadOrchestrator;
use period_ingest::period::Period;
use period_ingest::source::ConfiguredSource;
use period_ingest::validation::IssueKind;
use tempfile::tempdir;

const SCHEMAS: &str = r#"
orgaos:
  id: {obrigatorio: S, tipo: int}
  nome: {obrigatorio: S, tipo: str}
  uf: {obrigatorio: N, tipo: str, enum: [SP, RJ]}
contratos:
  id: {obrigatorio: S, tipo: int}
  orgao_id: {obrigatorio: S, tipo: int, ref: orgaos.id}
  valor: {obrigatorio: N, tipo: float}
"#;

fn setup(root: &Path, contratos_required: bool) -> LoaderConfig {
    fs::write(root.join("schemas.yaml"), SCHEMAS).unwrap();
    fs::create_dir_all(root.join("dados/20240105")).unwrap();

    // Referrers are declared first on purpose
    let toml = format!(
        r#"
schema_file = "schemas.yaml"

[sources.arquivos]
kind = "files"
root = "dados"

[[tables]]
name = "contratos"
source = "arquivos"
file = "{{period}}/contratos.csv"
validate = true
required = {contratos_required}

[[tables]]
name = "orgaos"
source = "arquivos"
file = "{{period}}/orgaos.csv"
validate = true
"#
    );
    fs::write(root.join("period-ingest.toml"), toml).unwrap();
    LoaderConfig::load(&root.join("period-ingest.toml")).unwrap()
}

fn write_day(root: &Path, name: &str, content: &str) {
    fs::write(root.join("dados/20240105").join(name), content).unwrap();
}

fn day() -> Period {
    "20240105".parse().unwrap()
}

#[test]
fn test_referenced_tables_are_validated_first() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), true);
    write_day(dir.path(), "orgaos.csv", "id;nome;uf\n1;Prefeitura;SP\n2;Câmara;\n");
    write_day(dir.path(), "contratos.csv", "id;orgao_id;valor\n10;1;1500\n11;2;320\n\n");

    let source = ConfiguredSource::from_config(&config).unwrap();
    let orchestrator = LoadOrchestrator::new(&config, &source, &DisabledFetcher);
    let batch = orchestrator.validate_day(day()).unwrap();

    let order: Vec<&str> = batch.outcomes.iter().map(|o| o.table.as_str()).collect();
    assert_eq!(order, vec!["orgaos", "contratos"]);
    assert!(batch.outcomes.iter().all(|o| o.accepted));

    // Whole-number values in a float column only warn
    let contratos = &batch.outcomes[1];
    assert_eq!(contratos.rows, 2);
    assert_eq!(contratos.warnings, 1);
    assert_eq!(contratos.diagnostics, 0);
    assert!(batch.context.contains("contratos"));
}

#[test]
fn test_dangling_reference_rejects_optional_table() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), false);
    write_day(dir.path(), "orgaos.csv", "id;nome;uf\n1;Prefeitura;RJ\n");
    write_day(dir.path(), "contratos.csv", "id;orgao_id;valor\n10;7;99.90\n");

    let source = ConfiguredSource::from_config(&config).unwrap();
    let orchestrator = LoadOrchestrator::new(&config, &source, &DisabledFetcher);
    let batch = orchestrator.validate_day(day()).unwrap();

    let rejected: Vec<&str> = batch.rejected().map(|o| o.table.as_str()).collect();
    assert_eq!(rejected, vec!["contratos"]);
    assert!(!batch.context.contains("contratos"));
    assert!(batch.context.contains("orgaos"));
}

#[test]
fn test_required_table_failure_carries_all_diagnostics() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), true);
    write_day(dir.path(), "orgaos.csv", "id;nome;uf\n1;Prefeitura;MG\n;Câmara;SP\n");
    write_day(dir.path(), "contratos.csv", "id;orgao_id;valor\n10;1;1.5\n");

    let source = ConfiguredSource::from_config(&config).unwrap();
    let orchestrator = LoadOrchestrator::new(&config, &source, &DisabledFetcher);

    match orchestrator.validate_day(day()) {
        Err(LoadError::Validation { table, diagnostics }) => {
            assert_eq!(table, "orgaos");
            let kinds: Vec<IssueKind> = diagnostics.iter().map(|d| d.kind).collect();
            assert!(kinds.contains(&IssueKind::NullInRequiredColumn));
            assert!(kinds.contains(&IssueKind::EnumViolation));
        }
        other => panic!("expected a validation failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_required_column_is_reported() {
    let dir = tempdir().unwrap();
    let config = setup(dir.path(), true);
    write_day(dir.path(), "orgaos.csv", "id;uf\n1;SP\n");
    write_day(dir.path(), "contratos.csv", "id;orgao_id;valor\n10;1;1.5\n");

    let source = ConfiguredSource::from_config(&config).unwrap();
    let orchestrator = LoadOrchestrator::new(&config, &source, &DisabledFetcher);

    let Err(LoadError::Validation { diagnostics, .. }) = orchestrator.validate_day(day()) else {
        panic!("expected a validation failure");
    };
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, IssueKind::MissingRequiredColumns);
    assert!(diagnostics[0].message.contains("nome"));
}

#[test]
fn test_missing_optional_file_is_accepted_empty() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("dados")).unwrap();
    let toml = r#"
[sources.arquivos]
kind = "files"
root = "dados"

[[tables]]
name = "logs"
source = "arquivos"
file = "logs/{period}.csv"
missing_ok = true
validate = true

[tables.schema.id]
obrigatorio = "S"
tipo = "int"

[[tables]]
name = "eventos"
source = "arquivos"
file = "eventos/{period}.csv"
missing_ok = true
validate = true

[tables.schema.log_id]
obrigatorio = "N"
tipo = "int"
ref = "logs.id"
"#;
    let config = LoaderConfig::parse_in(toml, dir.path()).unwrap();
    let source = ConfiguredSource::from_config(&config).unwrap();
    let orchestrator = LoadOrchestrator::new(&config, &source, &DisabledFetcher);

    let batch = orchestrator.validate_day(day()).unwrap();
    assert_eq!(batch.outcomes.len(), 2);
    assert!(batch.outcomes.iter().all(|o| o.accepted && o.rows == 0));
    assert!(batch.context.get("logs").unwrap().is_empty());
    assert!(batch.context.contains("eventos"));
}
