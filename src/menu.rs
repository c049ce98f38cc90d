//! Static festival menu served by `GET /menu`.
//!
//! Menu data is read-only reference data: it comes from the `[menu]` config
//! section (or the built-in Pongal 2026 list) and is never mutated after
//! startup. Field names on the wire follow what the avatar front end reads
//! (`type`, `incharge`, `servings`).

use serde::{Deserialize, Serialize};

/// One dish on the menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
    #[serde(rename = "incharge")]
    pub person_in_charge: String,
    /// Free-text status, e.g. `"To be confirmed"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        rename = "servings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub serving_count: Option<u32>,
}

impl MenuItem {
    fn new(id: u32, name: &str, category: &str, person_in_charge: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            category: category.to_owned(),
            person_in_charge: person_in_charge.to_owned(),
            status: None,
            serving_count: None,
        }
    }

    fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_owned());
        self
    }

    fn with_servings(mut self, servings: u32) -> Self {
        self.serving_count = Some(servings);
        self
    }
}

/// Payload of `GET /menu`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuResponse {
    pub event: String,
    pub total_items: usize,
    pub menu: Vec<MenuItem>,
}

impl MenuResponse {
    pub fn new(event: impl Into<String>, items: &[MenuItem]) -> Self {
        Self {
            event: event.into(),
            total_items: items.len(),
            menu: items.to_vec(),
        }
    }
}

/// The Pongal Celebrations 2026 menu.
pub fn pongal_2026_menu() -> Vec<MenuItem> {
    vec![
        MenuItem::new(1, "Panagam", "Beverage", "Venue"),
        MenuItem::new(2, "Sweet Pongal", "Main", "At the venue").with_servings(200),
        MenuItem::new(3, "Ven Pongal", "Main", "Maheswari Mam"),
        MenuItem::new(4, "Varagu Pongal (Sweet)", "Millet Special", "Indira Mam"),
        MenuItem::new(5, "Thinai Pongal", "Millet Special", "Adeline Mam"),
        MenuItem::new(6, "Gulab Jamun", "Dessert", "Anand Sir"),
        MenuItem::new(7, "Black Channa Sundal", "Snack", "Shankar Sir"),
        MenuItem::new(8, "White Channa Sundal", "Snack", "Dharanya Mam"),
        MenuItem::new(9, "Groundnut Sundal", "Snack", "Gowthami Mam"),
        MenuItem::new(10, "Milk Payasam", "Dessert", "Padma Mam").with_status("To be confirmed"),
        MenuItem::new(11, "Adai Payasam", "Dessert", "Liya Mam").with_status("To be confirmed"),
        MenuItem::new(12, "Kilangu (Sakkari & Marvalli)", "Traditional", "Indumathy Mam"),
        MenuItem::new(13, "Panakilangu", "Traditional", "Nirmala Mam"),
        MenuItem::new(14, "Vadai", "Snack", "TBD"),
        MenuItem::new(15, "Sugarcane (cubed)", "Fresh", "Students"),
        MenuItem::new(16, "Sweet Pongal", "Main", "Kavitha Mam"),
    ]
}
