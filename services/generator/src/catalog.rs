/// A product shoppers can view, add to cart, or buy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub price: f64,
}

/// The fixed storefront
pub const PRODUCTS: [Product; 6] = [
    Product {
        id: "prod_001",
        name: "Wireless Noise-Canceling Headphones",
        category: "Audio",
        price: 299.99,
    },
    Product {
        id: "prod_002",
        name: "Ergonomic Mechanical Keyboard",
        category: "Accessories",
        price: 149.50,
    },
    Product {
        id: "prod_003",
        name: "4K Ultra HD Gaming Monitor",
        category: "Electronics",
        price: 499.00,
    },
    Product {
        id: "prod_004",
        name: "Smart Home Security Camera",
        category: "Smart Home",
        price: 89.99,
    },
    Product {
        id: "prod_005",
        name: "Portable Espresso Maker",
        category: "Kitchen",
        price: 65.00,
    },
    Product {
        id: "prod_006",
        name: "Waterproof Hiking Backpack",
        category: "Outdoors",
        price: 110.00,
    },
];

pub const DEVICES: [&str; 3] = ["mobile", "desktop", "tablet"];

pub const LOCATIONS: [&str; 6] = ["US", "UK", "DE", "FR", "JP", "CA"];

pub const AD_SOURCES: [&str; 4] = ["google", "facebook", "tiktok", "email_blast"];
