use std::fmt;

use chrono::{DateTime, Utc};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// One extracted property. Every field has a zero value, so a record with
/// nothing found is still a complete row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub hotel_code: String,
    pub hotel_name: String,
    pub address: String,
    pub phone: String,
    pub rating: String,
    pub description: String,
    pub card_price: String,
    pub overview: OverviewTable,
    pub pets: OverviewTable,
    pub parking: OverviewTable,
    pub amenities: Vec<String>,
    pub nearby_places: Vec<NearbyPlace>,
    pub airports: Vec<AirportInfo>,
    pub is_pet_friendly: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlace {
    pub place: String,
    pub distance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportInfo {
    pub airport: String,
    pub distance: String,
    pub shuttle: String,
}

impl HotelRecord {
    /// Column order of the tabular output. Matches the field order above.
    pub const FIELDS: [&'static str; 15] = [
        "hotel_code",
        "hotel_name",
        "address",
        "phone",
        "rating",
        "description",
        "card_price",
        "overview",
        "pets",
        "parking",
        "amenities",
        "nearby_places",
        "airports",
        "is_pet_friendly",
        "last_updated",
    ];

    pub fn new(hotel_code: String) -> Self {
        HotelRecord {
            hotel_code,
            hotel_name: String::new(),
            address: String::new(),
            phone: String::new(),
            rating: String::new(),
            description: String::new(),
            card_price: String::new(),
            overview: OverviewTable::default(),
            pets: OverviewTable::default(),
            parking: OverviewTable::default(),
            amenities: vec![],
            nearby_places: vec![],
            airports: vec![],
            is_pet_friendly: false,
            last_updated: Utc::now(),
        }
    }

    /// Flattens the record into cells, nested values as compact JSON text.
    pub fn to_row(&self) -> Result<Vec<String>, serde_json::Error> {
        Ok(vec![
            self.hotel_code.clone(),
            self.hotel_name.clone(),
            self.address.clone(),
            self.phone.clone(),
            self.rating.clone(),
            self.description.clone(),
            self.card_price.clone(),
            serde_json::to_string(&self.overview)?,
            serde_json::to_string(&self.pets)?,
            serde_json::to_string(&self.parking)?,
            serde_json::to_string(&self.amenities)?,
            serde_json::to_string(&self.nearby_places)?,
            serde_json::to_string(&self.airports)?,
            self.is_pet_friendly.to_string(),
            self.last_updated.to_rfc3339(),
        ])
    }
}

pub fn build_hotel_code(prefix: &str, page: u32, position: usize) -> String {
    format!("{}-{}-{}", prefix, page, position)
}

/// Case-insensitive "pet" substring check over the whole detail text.
///
/// Known to over-match: "No pets allowed" counts as pet friendly.
pub fn mentions_pets(text: &str) -> bool {
    text.to_lowercase().contains("pet")
}

/// Label/value pairs in first-seen order. Re-inserting a label replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverviewTable(Vec<(String, String)>);

impl OverviewTable {
    pub fn insert(&mut self, label: String, value: String) {
        match self.0.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = value,
            None => self.0.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value.as_str())
    }

    /// Entries whose label contains `needle`, ignoring case.
    pub fn subset(&self, needle: &str) -> OverviewTable {
        let needle = needle.to_lowercase();
        OverviewTable(
            self.0
                .iter()
                .filter(|(label, _)| label.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }
}

impl Serialize for OverviewTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, value) in &self.0 {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

struct OverviewTableVisitor;

impl<'de> Visitor<'de> for OverviewTableVisitor {
    type Value = OverviewTable;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of string labels to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = OverviewTable::default();
        while let Some((label, value)) = access.next_entry::<String, String>()? {
            table.insert(label, value);
        }
        Ok(table)
    }
}

impl<'de> Deserialize<'de> for OverviewTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OverviewTableVisitor)
    }
}
