//! Baseline loading code for each source descriptor

use dps_core::{FileFormat, SourceDescriptor, TextOptions};
use dps_data::sources::SqliteSource;

use crate::helpers::Helper;
use crate::quote;
use crate::writer::{Import, Script};

const NULLABLE: &str = "dtype_backend=\"numpy_nullable\"";

/// Emit statements that leave the table described by `descriptor` in `target`
pub fn load(script: &mut Script, target: &str, descriptor: &SourceDescriptor) {
    script.import(Import::Pandas);
    match descriptor {
        SourceDescriptor::LocalFile { path, format, .. } => {
            let location = quote::path(path);
            match format {
                FileFormat::Csv | FileFormat::Tsv => {
                    read_delimited(script, target, &location, &descriptor.text_options());
                }
                FileFormat::Excel => {
                    script.line(format!("{} = pd.read_excel({}, {})", target, location, NULLABLE));
                }
                FileFormat::Json => {
                    script.line(format!("{} = pd.read_json({}, {})", target, location, NULLABLE));
                }
                FileFormat::Parquet => {
                    script.line(format!("{} = pd.read_parquet({}, {})", target, location, NULLABLE));
                }
            }
        }
        SourceDescriptor::Sheet { .. } => {
            script.import(Import::Io);
            script.import(Import::Requests);
            let url = descriptor.sheet_export_url().unwrap_or_default();
            let response = format!("{}_response", target);
            script.line(format!("{} = requests.get({}, timeout=60)", response, quote::string(&url)));
            script.line(format!("{}.raise_for_status()", response));
            read_delimited(
                script,
                target,
                &format!("io.StringIO({}.text)", response),
                &descriptor.text_options(),
            );
        }
        SourceDescriptor::Database { connection_string, query } => {
            if is_sqlite(connection_string) {
                script.import(Import::Sqlite3);
                let path = SqliteSource::database_path(connection_string);
                let connection = format!("{}_connection", target);
                script.line(format!("{} = sqlite3.connect({})", connection, quote::path(&path)));
                script.line(format!(
                    "{} = pd.read_sql_query({}, {}, {})",
                    target,
                    quote::string(query),
                    connection,
                    NULLABLE
                ));
                script.line(format!("{}.close()", connection));
            } else {
                script.import(Import::Sqlalchemy);
                let engine = format!("{}_engine", target);
                script.line(format!("{} = create_engine({})", engine, quote::string(connection_string)));
                script.line(format!("with {}.connect() as connection:", engine));
                script.indent();
                script.line(format!(
                    "{} = pd.read_sql_query(text({}), connection, {})",
                    target,
                    quote::string(query),
                    NULLABLE
                ));
                script.dedent();
            }
        }
        SourceDescriptor::Scratch { rows, cols, names } => {
            let names: Vec<String> = (0..*cols)
                .map(|i| names.get(i).cloned().unwrap_or_else(|| format!("col_{}", i + 1)))
                .collect();
            script.line(format!(
                "{t} = pd.DataFrame({{name: pd.Series([pd.NA] * {r}, dtype=\"string\") for name in {n}}}, index=range({r}))",
                t = target,
                r = rows,
                n = quote::list(&names)
            ));
        }
    }
}

fn read_delimited(script: &mut Script, target: &str, location: &str, options: &TextOptions) {
    script.helper(Helper::DetectDates);
    script.line(format!("{} = pd.read_csv(", target));
    script.indent();
    script.line(format!("{},", location));
    script.line(format!("sep={},", quote::string(&options.delimiter.to_string())));
    script.line(format!("decimal={},", quote::string(&options.decimal.to_string())));
    if let Some(thousands) = options.thousands {
        script.line(format!("thousands={},", quote::string(&thousands.to_string())));
    }
    if !options.has_header {
        script.line("header=None,");
    }
    script.line(format!("{},", NULLABLE));
    script.dedent();
    script.line(")");
    if options.has_header {
        script.line(format!(
            "{t}.columns = [f\"col_{{i + 1}}\" if str(name).startswith(\"Unnamed: \") else name for i, name in enumerate({t}.columns)]",
            t = target
        ));
    } else {
        script.line(format!(
            "{t}.columns = [f\"col_{{i + 1}}\" for i in range(len({t}.columns))]",
            t = target
        ));
    }
    script.line(format!("{t} = _detect_dates({t})", t = target));
}

/// Connection strings the sqlite3 module can open directly
fn is_sqlite(connection_string: &str) -> bool {
    let trimmed = connection_string.trim();
    trimmed.starts_with("sqlite:") || !trimmed.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn emit(descriptor: &SourceDescriptor) -> (String, Vec<Import>) {
        let mut script = Script::new();
        load(&mut script, "df", descriptor);
        let imports = script.imports().copied().collect();
        (script.into_body(), imports)
    }

    #[test]
    fn test_csv_passes_parsing_options() {
        let descriptor = SourceDescriptor::LocalFile {
            path: PathBuf::from("in.csv"),
            format: FileFormat::Csv,
            options: TextOptions {
                delimiter: ';',
                decimal: ',',
                thousands: Some('.'),
                has_header: true,
            },
        };
        let (body, imports) = emit(&descriptor);
        assert!(body.starts_with("df = pd.read_csv(\n    \"in.csv\",\n    sep=\";\",\n    decimal=\",\",\n    thousands=\".\",\n"));
        assert!(!body.contains("header=None"));
        assert!(body.contains("df = _detect_dates(df)"));
        assert_eq!(imports, vec![Import::Pandas]);
    }

    #[test]
    fn test_tsv_without_header() {
        let descriptor = SourceDescriptor::LocalFile {
            path: PathBuf::from("data.tsv"),
            format: FileFormat::Tsv,
            options: TextOptions {
                has_header: false,
                ..TextOptions::default()
            },
        };
        let (body, _) = emit(&descriptor);
        assert!(body.contains("sep=\"\\t\","));
        assert!(body.contains("header=None,"));
        assert!(body.contains("df.columns = [f\"col_{i + 1}\" for i in range(len(df.columns))]"));
    }

    #[test]
    fn test_sheet_fetches_csv_export() {
        let descriptor = SourceDescriptor::Sheet {
            sheet_id: "abc".into(),
            sheet_name: None,
            gid: Some("7".into()),
            delimiter: ',',
            decimal: '.',
            thousands: None,
        };
        let (body, imports) = emit(&descriptor);
        assert!(body.contains(
            "df_response = requests.get(\"https://docs.google.com/spreadsheets/d/abc/export?format=csv&gid=7\", timeout=60)"
        ));
        assert!(body.contains("io.StringIO(df_response.text),"));
        assert_eq!(imports, vec![Import::Io, Import::Pandas, Import::Requests]);
    }

    #[test]
    fn test_sqlite_and_server_databases() {
        let sqlite = SourceDescriptor::Database {
            connection_string: "sqlite:///tmp/shop.db".into(),
            query: "SELECT * FROM \"orders\"".into(),
        };
        let (body, imports) = emit(&sqlite);
        assert!(body.contains("df_connection = sqlite3.connect(\"/tmp/shop.db\")"));
        assert!(body.contains("pd.read_sql_query(\"SELECT * FROM \\\"orders\\\"\", df_connection"));
        assert!(imports.contains(&Import::Sqlite3));

        let server = SourceDescriptor::Database {
            connection_string: "postgresql://user@host/db".into(),
            query: "SELECT 1".into(),
        };
        let (body, imports) = emit(&server);
        assert!(body.contains("df_engine = create_engine(\"postgresql://user@host/db\")"));
        assert!(body.contains("    df = pd.read_sql_query(text(\"SELECT 1\"), connection"));
        assert!(imports.contains(&Import::Sqlalchemy));
    }

    #[test]
    fn test_scratch_pads_names() {
        let descriptor = SourceDescriptor::Scratch {
            rows: 3,
            cols: 2,
            names: vec!["a".into()],
        };
        let (body, _) = emit(&descriptor);
        assert!(body.contains("for name in [\"a\", \"col_2\"]"));
        assert!(body.contains("[pd.NA] * 3"));
    }
}
