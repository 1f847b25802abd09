use crate::domain::csv_import::{
    ImportResult, DEFAULT_MANUAL_CATEGORY, REQUIRED_COLUMNS, TEMPLATE_COLUMNS,
};
use crate::domain::error::{AppError, ImportError, Result};
use crate::domain::test_case::{NewTestCase, Priority, TestCase, TestCaseSource};
use crate::infrastructure::storage::Storage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

static STEP_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+\s*[.)]|[-*•])\s*").unwrap());

pub struct CsvImportUseCase {
    storage: Arc<dyn Storage>,
}

impl CsvImportUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Imports manual test cases. Only a missing required column fails the whole
    /// import; row problems are reported in `errors` and the rest still lands.
    pub async fn import_csv(&self, bytes: &[u8], document_id: Option<&str>) -> Result<ImportResult> {
        let text = decode_bytes(bytes)?;
        let mut rows = parse_csv(&text).into_iter();

        let header: Vec<String> = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();
        for required in REQUIRED_COLUMNS {
            if !header.iter().any(|name| name == required) {
                return Err(ImportError::MissingColumn(required.to_string()).into());
            }
        }

        let document_id = document_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let mut result = ImportResult::default();
        let mut new_cases = Vec::new();

        for (index, values) in rows.enumerate() {
            // header is row 1
            let row_number = index + 2;
            if values.iter().all(|value| value.trim().is_empty()) {
                continue;
            }

            let record: HashMap<&str, &str> = header
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(|value| value.trim()))
                .collect();

            match build_manual_case(&record, document_id.clone()) {
                Some(new_case) => new_cases.push(new_case),
                None => result
                    .errors
                    .push(format!("Row {}: Missing title or description", row_number)),
            }
        }

        result.test_cases = self.storage.create_test_cases(new_cases).await?;
        result.created = result.test_cases.len();
        if result.errors.is_empty() {
            info!(created = result.created, "Imported test cases from CSV");
        } else {
            warn!(
                created = result.created,
                failed = result.errors.len(),
                "Imported test cases from CSV with row errors"
            );
        }
        Ok(result)
    }

    /// Persisted test cases of a document in template column order.
    pub async fn export(&self, document_id: &str) -> Result<String> {
        let test_cases = self.storage.get_test_cases(Some(document_id)).await?;
        export_csv(&test_cases)
    }
}

fn non_empty<'a>(record: &HashMap<&str, &'a str>, column: &str) -> Option<&'a str> {
    record.get(column).copied().filter(|value| !value.is_empty())
}

fn build_manual_case(record: &HashMap<&str, &str>, document_id: Option<String>) -> Option<NewTestCase> {
    let title = non_empty(record, "title")?;
    let description = non_empty(record, "description")?;

    Some(NewTestCase {
        document_id,
        title: title.to_string(),
        description: description.to_string(),
        category: non_empty(record, "category")
            .unwrap_or(DEFAULT_MANUAL_CATEGORY)
            .to_string(),
        priority: non_empty(record, "priority")
            .and_then(Priority::parse)
            .unwrap_or_default(),
        preconditions: non_empty(record, "preconditions").map(str::to_string),
        steps: non_empty(record, "steps").map(split_steps).unwrap_or_default(),
        expected_result: non_empty(record, "expected_result").map(str::to_string),
        tags: non_empty(record, "tags").map(split_tags).unwrap_or_default(),
        source: TestCaseSource::Manual,
        confidence_score: None,
        context_used: Vec::new(),
    })
}

fn split_steps(value: &str) -> Vec<String> {
    value
        .lines()
        .map(|line| STEP_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn split_tags(value: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in value.split([',', ';']) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// UTF-16 with BOM, otherwise UTF-8 (BOM stripped); bytes that are not valid
/// UTF-8 are read as Windows-1252 whether or not a UTF-8 BOM was present.
pub fn decode_bytes(bytes: &[u8]) -> Result<String> {
    let text = match encoding_rs::Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) if encoding != encoding_rs::UTF_8 => {
            let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            if had_errors {
                return Err(
                    ImportError::Decode(format!("invalid {} content", encoding.name())).into(),
                );
            }
            text.into_owned()
        }
        Some((_, bom_len)) => utf8_or_windows_1252(&bytes[bom_len..]),
        None => utf8_or_windows_1252(bytes),
    };

    if text.contains('\0') {
        return Err(ImportError::Decode("file looks binary, not CSV text".to_string()).into());
    }
    Ok(text)
}

fn utf8_or_windows_1252(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

/// Quote-aware CSV tokenizer. `""` inside quotes is a literal quote, newlines
/// inside quotes belong to the field, and empty lines are skipped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_row(&mut rows, &mut row, &mut field);
            }
            _ => field.push(c),
        }
    }
    end_row(&mut rows, &mut row, &mut field);

    rows
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    if row.is_empty() && field.is_empty() {
        return;
    }
    row.push(std::mem::take(field));
    rows.push(std::mem::take(row));
}

fn write_records<I>(records: I) -> Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(TEMPLATE_COLUMNS)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;
    for record in records {
        writer
            .write_record(&record)
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {}", e)))
}

/// Header plus one example row.
pub fn template_csv() -> Result<String> {
    write_records([vec![
        "User can log in with valid credentials".to_string(),
        "Verify that a registered user can sign in, including names like \"O'Brien, Jr.\""
            .to_string(),
        "functional".to_string(),
        "high".to_string(),
        "User account exists".to_string(),
        "1. Open the login page\n2. Enter a valid email\n3. Enter the password\n4. Click \"Sign in\"\n5. Wait for the dashboard".to_string(),
        "Dashboard is shown".to_string(),
        TestCaseSource::Manual.as_str().to_string(),
    ]])
}

pub fn export_csv(test_cases: &[TestCase]) -> Result<String> {
    write_records(test_cases.iter().map(|case| {
        vec![
            case.title.clone(),
            case.description.clone(),
            case.category.clone(),
            case.priority.as_str().to_string(),
            case.preconditions.clone().unwrap_or_default(),
            case.steps.join("\n"),
            case.expected_result.clone().unwrap_or_default(),
            case.source.as_str().to_string(),
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::test_support::FailingWrites;
    use crate::infrastructure::storage::MemoryStorage;

    fn use_case() -> (CsvImportUseCase, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (CsvImportUseCase::new(storage.clone()), storage)
    }

    #[test]
    fn test_tokenizer_handles_quotes_and_newlines() {
        let rows = parse_csv("a,\"b, c\",\"say \"\"hi\"\"\"\r\n\r\n\"multi\nline\",,x\n");
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b, c".to_string(), "say \"hi\"".to_string()],
                vec!["multi\nline".to_string(), String::new(), "x".to_string()],
            ]
        );
    }

    #[test]
    fn test_tokenizer_without_trailing_newline() {
        assert_eq!(parse_csv("a,b"), vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(parse_csv("\n\n").is_empty());
    }

    #[test]
    fn test_quoted_field_round_trips() {
        let literal = "a,b\n\"c\"";
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([literal, "plain"]).unwrap();
        let encoded = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(encoded, "\"a,b\n\"\"c\"\"\",plain\n");
        assert_eq!(parse_csv(&encoded)[0][0], literal);
    }

    #[tokio::test]
    async fn test_import_multiline_description() {
        let (use_case, _) = use_case();
        let csv = "title,description,category,priority\n\"Login\",\"First line\nSecond line\",,\n";
        let result = use_case.import_csv(csv.as_bytes(), Some("doc-1")).await.unwrap();

        assert_eq!(result.created, 1);
        assert!(result.errors.is_empty());
        let case = &result.test_cases[0];
        assert_eq!(case.description, "First line\nSecond line");
        assert_eq!(case.category, DEFAULT_MANUAL_CATEGORY);
        assert_eq!(case.priority, Priority::Medium);
        assert_eq!(case.source, TestCaseSource::Manual);
        assert_eq!(case.document_id.as_deref(), Some("doc-1"));
    }

    #[tokio::test]
    async fn test_row_errors_do_not_abort() {
        let (use_case, storage) = use_case();
        let csv = "Title,Description,Priority\nOk,Works,HIGH\n,missing title,low\n,,\nAlso ok,Fine,urgent\nNo description,\n";
        let result = use_case.import_csv(csv.as_bytes(), None).await.unwrap();

        assert_eq!(result.created, 2);
        assert_eq!(
            result.errors,
            vec![
                "Row 3: Missing title or description".to_string(),
                "Row 6: Missing title or description".to_string(),
            ]
        );
        assert_eq!(result.test_cases[0].priority, Priority::High);
        assert_eq!(result.test_cases[1].priority, Priority::Medium);
        assert_eq!(storage.get_test_cases(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_imports_nothing() {
        let storage = Arc::new(FailingWrites::new());
        let importer = CsvImportUseCase::new(storage.clone());
        let result = importer
            .import_csv(b"title,description\nA,one\nB,two\n", Some("doc"))
            .await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert!(storage.get_test_cases(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_column_fails_import() {
        let (use_case, storage) = use_case();
        let err = use_case
            .import_csv(b"title,category\nA,functional\n", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Import(ImportError::MissingColumn(ref column)) if column == "description"
        ));
        assert!(storage.get_test_cases(None).await.unwrap().is_empty());

        assert!(matches!(
            use_case.import_csv(b"", None).await,
            Err(AppError::Import(ImportError::MissingColumn(_)))
        ));
    }

    #[tokio::test]
    async fn test_optional_columns_are_honoured() {
        let (use_case, _) = use_case();
        let csv = "title,description,preconditions,steps,expected_result,tags\n\
                   T,D,Logged in,\"1. Open\n2) Click\n- Check\n\",Done,\"UI; smoke, ui\"\n";
        let result = use_case.import_csv(csv.as_bytes(), None).await.unwrap();
        let case = &result.test_cases[0];
        assert_eq!(case.steps, vec!["Open", "Click", "Check"]);
        assert_eq!(case.preconditions.as_deref(), Some("Logged in"));
        assert_eq!(case.expected_result.as_deref(), Some("Done"));
        assert_eq!(case.tags, vec!["ui", "smoke"]);
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(decode_bytes(b"\xEF\xBB\xBFtitle").unwrap(), "title");
        assert_eq!(decode_bytes(b"caf\xE9").unwrap(), "café");
        assert_eq!(decode_bytes(b"\xEF\xBB\xBFcaf\xE9").unwrap(), "café");
        assert_eq!(decode_bytes(b"\xFF\xFEt\0i\0").unwrap(), "ti");
        assert!(matches!(
            decode_bytes(b"a\0b"),
            Err(AppError::Import(ImportError::Decode(_)))
        ));
    }

    #[test]
    fn test_template_header_is_exact() {
        let template = template_csv().unwrap();
        assert!(template.starts_with(
            "title,description,category,priority,preconditions,steps,expected_result,source\n"
        ));
        let rows = parse_csv(&template);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].len(), TEMPLATE_COLUMNS.len());
        assert!(rows[1][5].contains('\n'));
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let (importer, _) = use_case();
        let csv = "title,description,steps\n\"Quote \"\"x\"\"\",\"a,b\",\"one\ntwo\"\n";
        importer.import_csv(csv.as_bytes(), Some("doc")).await.unwrap();

        let exported = importer.export("doc").await.unwrap();
        let (again, _) = use_case();
        let result = again.import_csv(exported.as_bytes(), Some("doc")).await.unwrap();
        let case = &result.test_cases[0];
        assert_eq!(case.title, "Quote \"x\"");
        assert_eq!(case.description, "a,b");
        assert_eq!(case.steps, vec!["one", "two"]);
        assert_eq!(case.category, "Manual");
    }
}
