use assert_matches::assert_matches;

use anp_wells::classifier::{LinkClass, classify_link, classify_listing};
use anp_wells::config::ClassifierOptions;
use anp_wells::domain::Environment;

const LISTING: &str = r#"
<html>
  <body>
    <h1>Produção de petróleo e gás natural por poço</h1>
    <ul>
      <li><a href="https://www.gov.br/anp/arquivos/producao_mar_2023.csv">Produção 2023</a></li>
      <li><a href="/anp/arquivos/producao_terra_2023.csv">2023</a></li>
      <li><a href="producao_mar_2022.zip">Produção   marítima
          2022</a></li>
      <li><a href="https://www.gov.br/anp/arquivos/producao_mar_2023.csv">Produção 2023 (espelho)</a></li>
      <li><a href="https://www.gov.br/anp/arquivos/resumo_2021.csv">Resumo 2021</a></li>
      <li><a href="https://www.gov.br/anp/arquivos/producao_terra_2021.pdf">Terra 2021</a></li>
      <li><a href="https://www.gov.br/anp/arquivos/dicionario.csv">Dicionário de dados</a></li>
      <li><a href="https://www.gov.br/anp/contato">Contato</a></li>
    </ul>
  </body>
</html>
"#;

const BASE: &str = "https://www.gov.br/anp/pt-br/dados/producao-por-poco";

#[test]
fn offshore_keyword_in_href() {
    let class = classify_link(
        "Produção 2023",
        "https://x/producao_mar_2023.csv",
        &ClassifierOptions::default(),
    );
    assert_matches!(
        class,
        LinkClass::Classified { ref year, environment: Environment::Offshore } if year == "2023"
    );
}

#[test]
fn onshore_keyword_in_href_with_bare_year_text() {
    let class = classify_link(
        "2023",
        "https://x/producao_terra_2023.csv",
        &ClassifierOptions::default(),
    );
    assert_matches!(
        class,
        LinkClass::Classified { ref year, environment: Environment::Onshore } if year == "2023"
    );
}

#[test]
fn links_without_file_marker_or_year_are_rejected() {
    let options = ClassifierOptions::default();
    assert_matches!(
        classify_link("Terra 2021", "https://x/producao_terra_2021.pdf", &options),
        LinkClass::Rejected
    );
    assert_matches!(
        classify_link("Dicionário", "https://x/producao_mar.csv", &options),
        LinkClass::Rejected
    );
}

#[test]
fn listing_page_is_grouped_by_year_and_environment() {
    let catalog = classify_listing(LISTING.as_bytes(), Some(BASE), &ClassifierOptions::default());

    assert_eq!(catalog.years(), vec!["2023", "2022"]);
    assert_eq!(
        catalog.urls("2023", Environment::Offshore),
        ["https://www.gov.br/anp/arquivos/producao_mar_2023.csv".to_string()]
    );
    assert_eq!(
        catalog.urls("2023", Environment::Onshore),
        ["https://www.gov.br/anp/arquivos/producao_terra_2023.csv".to_string()]
    );
    assert_eq!(
        catalog.urls("2022", Environment::Offshore),
        ["https://www.gov.br/anp/pt-br/dados/producao_mar_2022.zip".to_string()]
    );
    assert_eq!(catalog.len(), 3);
    assert_eq!(
        catalog.unclassified,
        vec!["https://www.gov.br/anp/arquivos/resumo_2021.csv".to_string()]
    );
}

#[test]
fn each_year_environment_pair_has_one_descriptor() {
    let catalog = classify_listing(LISTING.as_bytes(), Some(BASE), &ClassifierOptions::default());
    let descriptors = catalog.descriptors();

    let offshore_2023 = descriptors
        .iter()
        .filter(|d| d.year == "2023" && d.environment == Environment::Offshore)
        .count();
    assert_eq!(offshore_2023, 1);
    assert_eq!(descriptors[0].year, "2023");
    assert_eq!(descriptors.last().map(|d| d.year.as_str()), Some("2022"));
}

#[test]
fn conflicting_keywords_follow_configuration() {
    let href = "https://x/producao_mar_2020.csv";
    let text = "Produção terra 2020";

    let prefer_href = ClassifierOptions::default();
    assert_matches!(
        classify_link(text, href, &prefer_href),
        LinkClass::Classified { environment: Environment::Offshore, .. }
    );

    let prefer_text = ClassifierOptions {
        prefer_href: false,
        ..ClassifierOptions::default()
    };
    assert_matches!(
        classify_link(text, href, &prefer_text),
        LinkClass::Classified { environment: Environment::Onshore, .. }
    );

    let drop_ties = ClassifierOptions {
        prefer_href: true,
        ambiguous_default: None,
    };
    assert_matches!(
        classify_link("mar e terra 2020", "https://x/producao_2020.csv", &drop_ties),
        LinkClass::Unclassified { .. }
    );
}

#[test]
fn empty_page_is_an_empty_catalog() {
    let catalog = classify_listing(b"", None, &ClassifierOptions::default());
    assert!(catalog.is_empty());
    assert!(catalog.unclassified.is_empty());
}
