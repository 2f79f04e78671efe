//! Read-only outlet and drinkware catalog.
//!
//! The engine never writes here; session memory holds only [`OutletRef`]
//! values and resolves them against the catalog on use.

use crate::types::{OutletRef, Region};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletRecord {
    pub name: String,
    pub location: String,
    pub open_time: String,
    pub close_time: String,
    pub phone: String,
    pub address: String,
    /// Lowercase phrasings that select this outlet within its region.
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub keyword: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    outlets: BTreeMap<Region, Vec<OutletRecord>>,
    products: Vec<ProductRecord>,
}

impl Catalog {
    pub fn new(outlets: BTreeMap<Region, Vec<OutletRecord>>, products: Vec<ProductRecord>) -> Self {
        Self { outlets, products }
    }

    /// Built-in dataset.
    pub fn builtin() -> Self {
        let mut outlets = BTreeMap::new();
        outlets.insert(
            Region::PetalingJaya,
            vec![
                outlet(
                    "SS 2 Outlet",
                    "SS 2, Petaling Jaya",
                    ("9:00 AM", "10:00 PM"),
                    "+603-1234-5678",
                    "123 SS 2/4, Petaling Jaya, Selangor",
                    &["ss 2", "ss2"],
                ),
                outlet(
                    "PJ Central Outlet",
                    "PJ Central, Petaling Jaya",
                    ("10:00 AM", "9:00 PM"),
                    "+603-2345-6789",
                    "456 PJ Central Mall, Petaling Jaya, Selangor",
                    &["pj central", "pjcentral", "central"],
                ),
            ],
        );
        outlets.insert(
            Region::KualaLumpur,
            vec![outlet(
                "KLCC Outlet",
                "KLCC, Kuala Lumpur",
                ("10:00 AM", "10:00 PM"),
                "+603-3456-7890",
                "789 KLCC Mall, Kuala Lumpur",
                &["klcc"],
            )],
        );

        let products = [
            ("mug", "Our ceramic mugs come in various sizes: 8oz, 12oz, and 16oz. Available in white, black, and custom colors."),
            ("cup", "We offer coffee cups, tea cups, and travel cups. Materials include ceramic, stainless steel, and glass."),
            ("bottle", "Water bottles available in plastic, stainless steel, and glass. Sizes from 12oz to 32oz."),
            ("tumbler", "Insulated tumblers keep drinks hot or cold for hours. Available in 16oz and 20oz sizes."),
            ("glass", "Drinking glasses in various styles: pint glasses, wine glasses, and cocktail glasses."),
            ("flask", "Stainless steel flasks for beverages on the go. Available in 8oz and 16oz sizes."),
        ]
        .into_iter()
        .map(|(keyword, description)| ProductRecord {
            keyword: keyword.into(),
            description: description.into(),
        })
        .collect();

        Self { outlets, products }
    }

    /// Outlets in `region`, in catalog order. Empty for an unserved region.
    pub fn outlets(&self, region: Region) -> &[OutletRecord] {
        self.outlets.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regions with at least one outlet.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.outlets
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(region, _)| *region)
    }

    /// "Petaling Jaya and Kuala Lumpur".
    pub fn region_list(&self) -> String {
        let names: Vec<&str> = self.regions().map(Region::display_name).collect();
        match names.split_last() {
            None => String::new(),
            Some((last, [])) => (*last).to_owned(),
            Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
        }
    }

    pub fn outlet_names(&self, region: Region) -> Vec<&str> {
        self.outlets(region).iter().map(|o| o.name.as_str()).collect()
    }

    /// Resolve a weak reference. `None` if the outlet no longer exists.
    pub fn resolve(&self, outlet: &OutletRef) -> Option<&OutletRecord> {
        self.outlets(outlet.region)
            .iter()
            .find(|o| o.name == outlet.name)
    }

    pub fn product(&self, keyword: &str) -> Option<&ProductRecord> {
        self.products.iter().find(|p| p.keyword == keyword)
    }

    /// First product whose keyword appears in `text` (case-insensitive).
    pub fn search_products(&self, text: &str) -> Option<&ProductRecord> {
        let lower = text.to_lowercase();
        self.products
            .iter()
            .find(|p| lower.contains(p.keyword.as_str()))
    }

    /// "mugs, cups, bottles, tumblers, glasses, and flasks".
    pub fn product_list(&self) -> String {
        let names: Vec<String> = self.products.iter().map(|p| plural(&p.keyword)).collect();
        match names.split_last() {
            None => String::new(),
            Some((last, [])) => last.clone(),
            Some((last, rest)) => format!("{}, and {}", rest.join(", "), last),
        }
    }
}

pub(crate) fn plural(word: &str) -> String {
    if word.ends_with('s') || word.ends_with("sh") || word.ends_with("ch") {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

fn outlet(
    name: &str,
    location: &str,
    (open_time, close_time): (&str, &str),
    phone: &str,
    address: &str,
    aliases: &[&str],
) -> OutletRecord {
    OutletRecord {
        name: name.into(),
        location: location.into(),
        open_time: open_time.into(),
        close_time: close_time.into(),
        phone: phone.into(),
        address: address.into(),
        aliases: aliases.iter().map(|a| (*a).to_owned()).collect(),
    }
}
