use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use camino::Utf8PathBuf;

use anp_wells::domain::{Environment, ScanMode, SourceCatalog};
use anp_wells::error::AnpError;
use anp_wells::fetcher::{FailureKind, SourceClient};
use anp_wells::field_index::{FieldIndexCache, extract_field_names};
use anp_wells::store::Store;

#[derive(Default)]
struct MockClient {
    files: HashMap<String, Vec<u8>>,
    calls: Mutex<usize>,
}

impl SourceClient for MockClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, AnpError> {
        *self.calls.lock().unwrap() += 1;
        self.files.get(url).cloned().ok_or_else(|| AnpError::Status {
            status: 503,
            message: "unavailable".to_string(),
        })
    }
}

fn source(fields: &[&str]) -> Vec<u8> {
    let mut text = String::from("Produção por poço\n\n[Poço];[Campo];[Ano];[Mês]\n");
    for (index, field) in fields.iter().enumerate() {
        text.push_str(&format!("P{index};{field};2020;1\n"));
    }
    text.into_bytes()
}

fn url(year: u32) -> String {
    format!("https://anp/producao_mar_{year}.csv")
}

/// Offshore sources 2019..=2023, each holding one distinct field plus a shared one.
fn fixture() -> (SourceCatalog, MockClient) {
    let mut catalog = SourceCatalog::new();
    let mut client = MockClient::default();
    for year in 2019..=2023 {
        catalog.insert(&year.to_string(), Environment::Offshore, &url(year));
        let own = format!("CAMPO_{year}");
        client
            .files
            .insert(url(year), source(&[own.as_str(), "MARLIM"]));
    }
    catalog.insert("2023", Environment::Onshore, "https://anp/producao_terra_2023.csv");
    client.files.insert(
        "https://anp/producao_terra_2023.csv".to_string(),
        source(&["CANDEIAS"]),
    );
    (catalog, client)
}

fn cache() -> (tempfile::TempDir, FieldIndexCache) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, FieldIndexCache::new(Store::new_with_root(root)))
}

#[test]
fn header_on_line_twelve_is_found() {
    let mut text = String::new();
    for line in 1..=11 {
        text.push_str(&format!("Relatório ANP, linha {line}\n"));
    }
    text.push_str("Poço;Campo;Período\nP1;BÚZIOS;2023\nP2;TUPI;2023\nP3;BÚZIOS;2023\n");
    let names = extract_field_names(text.into_bytes(), 100).unwrap();
    assert_eq!(
        names,
        BTreeSet::from(["BÚZIOS".to_string(), "TUPI".to_string()])
    );
}

#[test]
fn comma_delimited_file_is_supported() {
    let text = "Nome Poço ANP,Campo,Bacia\nP1,ALBACORA,Campos\nP2, RONCADOR ,Campos\n";
    let names = extract_field_names(text.as_bytes().to_vec(), 100).unwrap();
    assert!(names.contains("RONCADOR"));
    assert_eq!(names.len(), 2);
}

#[test]
fn quick_scan_reads_only_the_newest_files() {
    let (_temp, cache) = cache();
    let (catalog, client) = fixture();

    let build = cache
        .build_index(&client, &catalog, Environment::Offshore, ScanMode::Quick, 3, 100)
        .unwrap();

    assert_eq!(build.scanned, vec![url(2023), url(2022), url(2021)]);
    assert!(build.fields.contains("CAMPO_2023"));
    assert!(!build.fields.contains("CAMPO_2019"));
    assert!(!build.fields.contains("CANDEIAS"));
    assert_eq!(build.added, 4);
    assert_eq!(*client.calls.lock().unwrap(), 3);
}

#[test]
fn full_scan_after_quick_scan_is_a_superset() {
    let (_temp, cache) = cache();
    let (catalog, client) = fixture();

    let quick = cache
        .build_index(&client, &catalog, Environment::Offshore, ScanMode::Quick, 3, 100)
        .unwrap();
    let full = cache
        .build_index(&client, &catalog, Environment::Offshore, ScanMode::Full, 3, 100)
        .unwrap();

    assert!(full.fields.is_superset(&quick.fields));
    assert_eq!(full.fields.len(), 6);
    assert_eq!(full.added, 2);
    // Files downloaded by the quick scan come from the raw cache.
    assert_eq!(*client.calls.lock().unwrap(), 5);
    assert_eq!(cache.load_index(Environment::Offshore), full.fields);
}

#[test]
fn later_builds_never_prune_names() {
    let (_temp, cache) = cache();
    let (catalog, client) = fixture();
    let mut seeded = BTreeSet::new();
    seeded.insert("LEGACY".to_string());
    cache.store_index(Environment::Offshore, &seeded).unwrap();

    let build = cache
        .build_index(&client, &catalog, Environment::Offshore, ScanMode::Quick, 1, 100)
        .unwrap();
    assert!(build.fields.contains("LEGACY"));
    assert!(build.fields.contains("CAMPO_2023"));
}

#[test]
fn unreachable_file_is_skipped() {
    let (_temp, cache) = cache();
    let (mut catalog, client) = fixture();
    catalog.insert("2024", Environment::Offshore, "https://anp/producao_mar_2024.csv");

    let build = cache
        .build_index(&client, &catalog, Environment::Offshore, ScanMode::Quick, 2, 100)
        .unwrap();
    assert_eq!(build.failures.len(), 1);
    assert_eq!(build.failures[0].kind, FailureKind::Network);
    assert_eq!(build.failures[0].year.as_deref(), Some("2024"));
    assert_eq!(build.scanned, vec![url(2023)]);
}

#[test]
fn environments_are_indexed_separately() {
    let (_temp, cache) = cache();
    let (catalog, client) = fixture();

    cache
        .build_index(&client, &catalog, Environment::Onshore, ScanMode::Full, 3, 100)
        .unwrap();
    assert_eq!(
        cache.load_index(Environment::Onshore),
        BTreeSet::from(["CANDEIAS".to_string()])
    );
    assert!(cache.load_index(Environment::Offshore).is_empty());
}
