use chrono::NaiveDate;
use drill_ledger::config::Config;
use drill_ledger::database::appender::AppendReport;
use drill_ledger::database::stats::load_records;
use drill_ledger::database::stats::Summary;
use drill_ledger::ingest::field::SourceField;
use drill_ledger::pipeline::FileOutcome;
use drill_ledger::pipeline::Pipeline;
use drill_ledger::spreadsheet::cell::CellValue;
use drill_ledger::spreadsheet::criteria::Criteria;
use drill_ledger::spreadsheet::open_spreadsheet;
use drill_ledger::spreadsheet::sheet::Sheet;
use drill_ledger::spreadsheet::writer::WorkbookWriter;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;

struct Workspace {
    _directory: TempDir,
    config: Config,
}

impl Workspace {
    fn new() -> Self {
        let directory = tempfile::tempdir().unwrap();
        let source_folder = directory.path().join("Daily_Data");
        std::fs::create_dir(&source_folder).unwrap();
        let config = Config {
            source_folder,
            database_file: directory.path().join("drilling_database.xlsx"),
            ..Config::default()
        };
        Workspace { _directory: directory, config }
    }

    fn pipeline(&self) -> Pipeline {
        let pipeline = Pipeline::new(&self.config).unwrap();
        pipeline.appender().create_empty().unwrap();
        pipeline
    }

    fn source(&self, name: &str) -> PathBuf {
        self.config.source_folder.join(name)
    }

    fn database(&self) -> Sheet {
        let mut spreadsheet = open_spreadsheet(&self.config.database_file).unwrap();
        spreadsheet.read_sheet(&Criteria::default()).unwrap()
    }
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_owned())
}

fn march_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// A `B:V` row with the interval fields at their standard offsets.
fn interval(from: CellValue, to: CellValue, recovery: CellValue, material: &str) -> Vec<CellValue> {
    let mut cells = vec![CellValue::Empty; 21];
    cells[SourceField::From.default_offset()] = from;
    cells[SourceField::To.default_offset()] = to;
    cells[SourceField::Interval.default_offset()] = CellValue::Number(1.5);
    cells[SourceField::Recovery.default_offset()] = recovery;
    cells[SourceField::Material.default_offset()] = text(material);
    cells[SourceField::Rock.default_offset()] = text("IGR");
    cells[SourceField::Weathering.default_offset()] = text("HW");
    cells
}

fn standard_intervals() -> Vec<Vec<CellValue>> {
    vec![
        interval(CellValue::Number(0.0), CellValue::Number(1.5), CellValue::Number(85.0), "Granite"),
        interval(CellValue::Empty, CellValue::Empty, CellValue::Empty, "note"),
        interval(CellValue::Number(1.5), CellValue::Number(3.0), CellValue::Empty, "BASALT"),
    ]
}

fn header() -> Vec<CellValue> {
    let mut cells = vec![CellValue::Empty; 21];
    for field in SourceField::ALL {
        cells[field.default_offset()] = text(field.default_label());
    }
    cells
}

fn write_log(path: &Path, hole_id: CellValue, logging_date: CellValue, with_header: bool, rows: Vec<Vec<CellValue>>) {
    let mut writer = WorkbookWriter::new("Log");
    writer
        .set_reference("A3", text("HOLE ID"))
        .set_reference("B3", hole_id)
        .set_reference("K4", text("DATE"))
        .set_reference("L4", logging_date);
    if with_header {
        writer.set_row(5, 1, header());
    }
    for (index, row) in rows.into_iter().enumerate() {
        writer.set_row(6 + index, 1, row);
    }
    writer.save(path).unwrap();
}

fn write_standard_log(path: &Path) {
    write_log(path, text("C06-090"), CellValue::Date(march_first()), true, standard_intervals());
}

#[test]
fn daily_log_lands_below_header() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let log = workspace.source("C06-090.xlsx");
    write_standard_log(&log);

    let outcome = pipeline.process(&log);
    assert_eq!(
        outcome,
        FileOutcome::Appended(AppendReport {
            header_written: true,
            first_row: 2,
            last_row: 3,
            rows: 2
        })
    );

    let sheet = workspace.database();
    assert_eq!(sheet.last_row(), Some(2));
    assert_eq!(sheet.value(0, 2).unwrap(), text("Hole ID"));
    assert_eq!(sheet.value(1, 1).unwrap(), CellValue::Date(march_first()));
    assert_eq!(sheet.value(1, 2).unwrap(), text("C06-090"));
    assert_eq!(sheet.value(1, 3).unwrap(), CellValue::Number(0.0));
    assert_eq!(sheet.value(1, 7).unwrap(), CellValue::Number(0.85));
    assert_eq!(sheet.value(1, 8).unwrap(), text("granite"));
    assert_eq!(sheet.value(1, 10).unwrap(), text("igr"));
    assert_eq!(sheet.value(1, 13).unwrap(), text("HW"));
    assert_eq!(sheet.value(2, 3).unwrap(), CellValue::Number(1.5));
    assert_eq!(sheet.value(2, 7).unwrap(), CellValue::Number(1.0));
    assert_eq!(sheet.value(2, 8).unwrap(), text("basalt"));
    assert_eq!(pipeline.appender().last_row().unwrap(), 3);
}

#[test]
fn positional_layout_matches_named_layout() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let named = workspace.source("named.xlsx");
    let positional = workspace.source("positional.xlsx");
    write_standard_log(&named);
    write_log(&positional, text("C06-090"), CellValue::Date(march_first()), false, standard_intervals());

    let named = pipeline.ingestor().ingest(&named).unwrap();
    let positional = pipeline.ingestor().ingest(&positional).unwrap();
    assert_eq!(named.mapping.kind(), "named");
    assert_eq!(positional.mapping.kind(), "positional");
    assert_eq!(named.rows.len(), 2);
    assert_eq!(named.rows, positional.rows);
    assert_eq!(named.skipped, 1);
}

#[test]
fn reingesting_appends_again() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let log = workspace.source("C06-090.xlsx");
    write_standard_log(&log);

    pipeline.process(&log);
    let outcome = pipeline.process(&log);
    assert_eq!(
        outcome,
        FileOutcome::Appended(AppendReport {
            header_written: false,
            first_row: 4,
            last_row: 5,
            rows: 2
        })
    );

    let sheet = workspace.database();
    let headers = (0..=sheet.last_row().unwrap())
        .filter(|row| sheet.value(*row, 2).unwrap() == text("Hole ID"))
        .count();
    assert_eq!(headers, 1);
    assert_eq!(sheet.value(3, 2).unwrap(), text("C06-090"));
    assert_eq!(sheet.value(4, 3).unwrap(), CellValue::Number(1.5));
}

#[test]
fn text_logging_date_is_parsed() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let log = workspace.source("C06-091.xlsx");
    write_log(&log, text(" C06-091 "), text("2024-03-01 08:30:00"), true, standard_intervals());

    let ingested = pipeline.ingestor().ingest(&log).unwrap();
    assert_eq!(ingested.metadata.hole_id, "C06-091");
    assert_eq!(ingested.metadata.logging_date, march_first());
}

#[test]
fn rejected_files_leave_database_untouched() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let before = std::fs::read(&workspace.config.database_file).unwrap();

    let missing_hole = workspace.source("missing_hole.xlsx");
    write_log(&missing_hole, CellValue::Empty, CellValue::Date(march_first()), true, standard_intervals());
    let bad_date = workspace.source("bad_date.xlsx");
    write_log(&bad_date, text("C06-090"), text("yesterday"), true, standard_intervals());
    let bad_depth = workspace.source("bad_depth.xlsx");
    let mut rows = standard_intervals();
    rows[2][SourceField::To.default_offset()] = text("end");
    write_log(&bad_depth, text("C06-090"), CellValue::Date(march_first()), true, rows);

    for log in [&missing_hole, &bad_date, &bad_depth] {
        match pipeline.process(log) {
            FileOutcome::Failed { rejected, reason } => {
                assert!(rejected, "{}", reason);
                assert!(reason.contains(&*log.to_string_lossy()), "{}", reason);
            }
            outcome => panic!("{} was not rejected: {:?}", log.display(), outcome),
        }
    }
    assert_eq!(std::fs::read(&workspace.config.database_file).unwrap(), before);
    assert_eq!(pipeline.appender().last_row().unwrap(), 0);
}

#[test]
fn unsupported_files_are_ignored() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    let notes = workspace.source("notes.csv");
    std::fs::write(&notes, b"FROM,TO\n0,1\n").unwrap();
    assert_eq!(pipeline.process(&notes), FileOutcome::Ignored);
    assert_eq!(pipeline.process(&workspace.source("~$C06-090.xlsx")), FileOutcome::Ignored);
    assert_eq!(pipeline.appender().last_row().unwrap(), 0);
}

#[test]
fn rescan_processes_each_file_independently() {
    let workspace = Workspace::new();
    let pipeline = workspace.pipeline();
    write_standard_log(&workspace.source("a.xlsx"));
    write_log(&workspace.source("b.xlsx"), CellValue::Empty, CellValue::Date(march_first()), true, standard_intervals());
    write_log(&workspace.source("c.xlsx"), text("C06-092"), CellValue::Date(march_first()), true, standard_intervals());
    std::fs::write(workspace.source("readme.txt"), b"daily logs").unwrap();

    let outcomes = pipeline.rescan().unwrap();
    let names: Vec<_> = outcomes
        .iter()
        .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.xlsx", "b.xlsx", "c.xlsx"]);
    assert!(matches!(outcomes[0].1, FileOutcome::Appended(AppendReport { first_row: 2, last_row: 3, .. })));
    assert!(matches!(outcomes[1].1, FileOutcome::Failed { rejected: true, .. }));
    assert!(matches!(outcomes[2].1, FileOutcome::Appended(AppendReport { first_row: 4, last_row: 5, .. })));

    let records = load_records(&workspace.config.database_file, &workspace.config.database).unwrap();
    let summary = Summary::from_records(&records);
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.hole_ids, vec!["C06-090".to_owned(), "C06-092".to_owned()]);
    assert_eq!(summary.deepest, 3.0);
    assert_eq!(summary.shallowest, 0.0);
    assert_eq!(summary.average_length, 1.5);
}
