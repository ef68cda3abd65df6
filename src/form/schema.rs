//! Typed accident-report document schema.
//!
//! The field names are the Polish wire names used by both the conversational
//! agent and the wizard UI, so the structs serialize 1:1 to the payloads the
//! clients exchange. Deserializing a merged `serde_json::Value` back into
//! `AccidentReportForm` is the structural validation gate for the merge
//! engine: required fields must be present with the right types, unknown
//! fields are silently dropped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Residential address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub ulica: String,
    pub nr_domu: String,
    pub nr_lokalu: String,
    pub kod_pocztowy: String,
    pub miejscowosc: String,
    pub panstwo: Option<String>,
}

/// Business address, with an optional phone number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessAddress {
    pub ulica: String,
    pub nr_domu: String,
    pub nr_lokalu: String,
    pub kod_pocztowy: String,
    pub miejscowosc: String,
    pub panstwo: Option<String>,
    pub telefon: Option<String>,
}

/// Correspondence address variants: a street address, poste restante, or a
/// PO box (`typ` is one of `adres`, `poste-restante`, `skrytka`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceAddress {
    pub typ: String,
    pub adres: Option<Address>,
    pub kod_pocztowy_placowki: Option<String>,
    pub nazwa_placowki: Option<String>,
    pub numer_skrytki: Option<String>,
    pub kod_pocztowy_skrytki: Option<String>,
    pub nazwa_placowki_skrytki: Option<String>,
}

/// Personal data of the injured party or the reporting person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
    pub pesel: String,
    pub dokument_typ: String,
    pub dokument_seria: String,
    pub dokument_numer: String,
    pub imie: String,
    pub nazwisko: String,
    pub data_urodzenia: String,
    pub miejsce_urodzenia: String,
    pub telefon: String,
}

/// A single witness entry. Witnesses live in a positional list; ids are
/// assigned server-side so partial updates can target entries by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub id: String,
    pub imie: String,
    pub nazwisko: String,
    pub ulica: String,
    pub nr_domu: String,
    pub nr_lokalu: String,
    pub kod_pocztowy: String,
    pub miejscowosc: String,
    pub panstwo: Option<String>,
}

impl Witness {
    /// A blank witness with a freshly assigned id, used when the merge
    /// engine has to create or back-fill list entries.
    pub fn with_default_fields() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }
}

/// Accident circumstances section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccidentDetails {
    pub data: String,
    pub godzina: String,
    pub miejsce: String,
    pub godzina_rozpoczecia_pracy: String,
    pub godzina_zakonczenia_pracy: String,
    pub opis_urazow: String,
    pub opis_okolicznosci: String,
    pub pierwsza_pomoc: bool,
    pub pierwsza_pomoc_nazwa: Option<String>,
    pub pierwsza_pomoc_adres: Option<String>,
    pub postepowanie_prowadzone: bool,
    pub postepowanie_organ: Option<String>,
    pub postepowanie_adres: Option<String>,
    pub obsluga_maszyn: bool,
    pub maszyny_sprawne: Option<bool>,
    pub maszyny_zgodnie_z_zasadami: Option<bool>,
    pub maszyny_opis: Option<String>,
    pub atest_deklaracja: bool,
    pub ewidencja_srodkow_trwalych: bool,
}

/// The full accident-report form document.
///
/// `Default` produces the initial empty document handed out when a session
/// key is first referenced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccidentReportForm {
    pub poszkodowany: PersonData,
    pub adres_zamieszkania: Address,
    pub mieszka_za_granica: bool,
    pub ostatni_adres_pl: Option<Address>,
    pub inny_adres_korespondencyjny: bool,
    pub adres_korespondencyjny: Option<CorrespondenceAddress>,
    pub adres_dzialalnosci: BusinessAddress,
    pub zglaszajacy_inny: bool,
    pub zglaszajacy: Option<PersonData>,
    pub zglaszajacy_adres_zamieszkania: Option<Address>,
    pub zglaszajacy_mieszka_za_granica: Option<bool>,
    pub zglaszajacy_ostatni_adres_pl: Option<Address>,
    pub zglaszajacy_inny_adres_korespondencyjny: Option<bool>,
    pub zglaszajacy_adres_korespondencyjny: Option<CorrespondenceAddress>,
    pub szczegoly: AccidentDetails,
    pub swiadkowie: Vec<Witness>,
}
