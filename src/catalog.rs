use crate::models::GarmentItem;

/// The fixed garment catalog. Small enough to return in full, always in
/// insertion order; there is no filtering or pagination.
pub struct Catalog {
    items: Vec<GarmentItem>,
}

impl Catalog {
    /// The two jubilee-edition shirts.
    pub fn jubilee_collection() -> Self {
        Self {
            items: vec![
                GarmentItem {
                    id: "tshirt-1".into(),
                    name: "Camiseta Laranja".into(),
                    mockup_url:
                        "https://raw.githubusercontent.com/mblarson/sistemapresenca/main/laranjamockpfrente.png"
                            .into(),
                    flat_art_url:
                        "https://raw.githubusercontent.com/mblarson/sistemapresenca/main/laranjaartefrente.png"
                            .into(),
                },
                GarmentItem {
                    id: "tshirt-2".into(),
                    name: "Camiseta Verde".into(),
                    mockup_url:
                        "https://raw.githubusercontent.com/mblarson/sistemapresenca/main/frenteverde.png"
                            .into(),
                    flat_art_url:
                        "https://raw.githubusercontent.com/mblarson/sistemapresenca/main/imagemfrenteverde (1).png"
                            .into(),
                },
            ],
        }
    }

    pub fn list(&self) -> &[GarmentItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&GarmentItem> {
        self.items.iter().find(|item| item.id == id)
    }
}
