//! Canonical record layout and the source headers that feed it.
//!
//! Source files are published with Portuguese headers (optionally wrapped in
//! brackets, which the fetcher strips). Each canonical field lists the header
//! spellings it accepts, first match wins.

use serde::{Deserialize, Serialize};

use crate::domain::Environment;

pub const WELL_HEADERS: &[&str] = &["Poço", "Poco", "Nome Poço ANP", "Well"];
pub const FIELD_HEADERS: &[&str] = &["Campo", "Field"];
pub const YEAR_HEADERS: &[&str] = &["Ano", "Year"];
pub const MONTH_HEADERS: &[&str] = &["Mês", "Mes", "Month"];
pub const MONTH_YEAR_HEADERS: &[&str] = &["Mês/Ano", "Mes/Ano", "Month/Year"];

/// Column appended to every fetched table to carry its environment.
pub const ENVIRONMENT_TAG: &str = "Environment";

/// Header marker used to find the header row of a source file.
pub const FIELD_MARKER: &str = "Campo";

/// Administrative columns removed before the derived metrics are computed.
pub const PRUNED_HEADERS: &[&str] = &[
    "Bacia",
    "Instalação",
    "Estado",
    "Ambiente",
    "Produção de Condensado (m³)",
    "Injeção de Polímeros (m³)",
    "Injeção de Outros Fluidos (m³)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    OilProduction,
    AssociatedGasProduction,
    NonAssociatedGasProduction,
    WaterProduction,
    GasInjection,
    WaterInjectionSecondary,
    WaterInjectionDisposal,
    Co2Injection,
    N2Injection,
    SteamInjection,
}

impl Measurement {
    pub const ALL: [Measurement; 10] = [
        Measurement::OilProduction,
        Measurement::AssociatedGasProduction,
        Measurement::NonAssociatedGasProduction,
        Measurement::WaterProduction,
        Measurement::GasInjection,
        Measurement::WaterInjectionSecondary,
        Measurement::WaterInjectionDisposal,
        Measurement::Co2Injection,
        Measurement::N2Injection,
        Measurement::SteamInjection,
    ];

    pub fn source_headers(&self) -> &'static [&'static str] {
        match self {
            Measurement::OilProduction => &["Produção de Óleo (m³)", "OilProduction"],
            Measurement::AssociatedGasProduction => {
                &["Produção de Gás Associado (Mm³)", "AssociatedGasProduction"]
            }
            Measurement::NonAssociatedGasProduction => &[
                "Produção de Gás Não Associado (Mm³)",
                "NonAssociatedGasProduction",
            ],
            Measurement::WaterProduction => &["Produção de Água (m³)", "WaterProduction"],
            Measurement::GasInjection => &["Injeção de Gás (Mm³)", "GasInjection"],
            Measurement::WaterInjectionSecondary => &[
                "Injeção de Água para Recuperação Secundária (m³)",
                "WaterInjectionSecondary",
            ],
            Measurement::WaterInjectionDisposal => &[
                "Injeção de Água para Descarte (m³)",
                "WaterInjectionDisposal",
            ],
            Measurement::Co2Injection => &["Injeção de Gás Carbônico (Mm³)", "CO2Injection"],
            Measurement::N2Injection => &["Injeção de Nitrogênio (Mm³)", "N2Injection"],
            Measurement::SteamInjection => &["Injeção de Vapor de Água (t)", "SteamInjection"],
        }
    }
}

/// Monthly volumes of one well. Gas in thousands of m³, liquids in m³, steam in t.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Volumes {
    pub oil: f64,
    pub associated_gas: f64,
    pub non_associated_gas: f64,
    pub water: f64,
    pub gas_injection: f64,
    pub water_injection_secondary: f64,
    pub water_injection_disposal: f64,
    pub co2_injection: f64,
    pub n2_injection: f64,
    pub steam_injection: f64,
}

impl Volumes {
    pub fn get(&self, measurement: Measurement) -> f64 {
        match measurement {
            Measurement::OilProduction => self.oil,
            Measurement::AssociatedGasProduction => self.associated_gas,
            Measurement::NonAssociatedGasProduction => self.non_associated_gas,
            Measurement::WaterProduction => self.water,
            Measurement::GasInjection => self.gas_injection,
            Measurement::WaterInjectionSecondary => self.water_injection_secondary,
            Measurement::WaterInjectionDisposal => self.water_injection_disposal,
            Measurement::Co2Injection => self.co2_injection,
            Measurement::N2Injection => self.n2_injection,
            Measurement::SteamInjection => self.steam_injection,
        }
    }

    pub fn set(&mut self, measurement: Measurement, value: f64) {
        let slot = match measurement {
            Measurement::OilProduction => &mut self.oil,
            Measurement::AssociatedGasProduction => &mut self.associated_gas,
            Measurement::NonAssociatedGasProduction => &mut self.non_associated_gas,
            Measurement::WaterProduction => &mut self.water,
            Measurement::GasInjection => &mut self.gas_injection,
            Measurement::WaterInjectionSecondary => &mut self.water_injection_secondary,
            Measurement::WaterInjectionDisposal => &mut self.water_injection_disposal,
            Measurement::Co2Injection => &mut self.co2_injection,
            Measurement::N2Injection => &mut self.n2_injection,
            Measurement::SteamInjection => &mut self.steam_injection,
        };
        *slot = value;
    }

    pub fn total_gas(&self) -> f64 {
        self.associated_gas + self.non_associated_gas
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub environment: Option<Environment>,
    pub well: String,
    pub field: String,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub volumes: Volumes,
    pub elapsed_days: i64,
    pub cumulative_oil: f64,
    pub gas_oil_ratio: f64,
    pub water_oil_ratio: f64,
    /// `ln(oil)`; absent when oil production is not positive.
    pub log_oil_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
}

const fn column(name: &'static str, kind: ColumnType, nullable: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable,
    }
}

/// Ordered export schema of the processed dataset.
pub const CANONICAL_COLUMNS: &[ColumnSpec] = &[
    column("Environment", ColumnType::Text, true),
    column("Well", ColumnType::Text, false),
    column("Field", ColumnType::Text, false),
    column("Year", ColumnType::Integer, true),
    column("Month", ColumnType::Integer, true),
    column("OilProduction", ColumnType::Float, false),
    column("AssociatedGasProduction", ColumnType::Float, false),
    column("NonAssociatedGasProduction", ColumnType::Float, false),
    column("WaterProduction", ColumnType::Float, false),
    column("GasInjection", ColumnType::Float, false),
    column("WaterInjectionSecondary", ColumnType::Float, false),
    column("WaterInjectionDisposal", ColumnType::Float, false),
    column("CO2Injection", ColumnType::Float, false),
    column("N2Injection", ColumnType::Float, false),
    column("SteamInjection", ColumnType::Float, false),
    column("ElapsedDays", ColumnType::Integer, false),
    column("CumulativeOil", ColumnType::Float, false),
    column("GasOilRatio", ColumnType::Float, false),
    column("WaterOilRatio", ColumnType::Float, false),
    column("LogOilRate", ColumnType::Float, true),
];

/// Canonical column name of a measurement (the second accepted header).
pub fn measurement_column(measurement: Measurement) -> &'static str {
    measurement.source_headers()[1]
}
