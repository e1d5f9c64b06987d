//! Rule-based request reading and gift planning for the standard workshop.
//!
//! Keyword and regex rules only. They pick out a name, an age, a place and
//! the wished-for gift, and map gift keywords to artisan roles.

use std::sync::LazyLock;

use regex::Regex;
use workshop_state::{BomEntry, DesignUpdate, Feasibility, Fulfilment, SubjectInfo};

use crate::workshop::artisans::{self, LIBRARIAN};

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:child|kid|boy|girl|my name is|i am|i'm|named)\s+([A-Z][a-zA-Z'-]+)")
        .expect("name regex should compile")
});

static LEADING_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z][a-zA-Z'-]+),?\s+(?:\(|age|aged|\d|wants|would|wishes|asks)")
        .expect("leading name regex should compile")
});

static AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:age[d]?\s*(\d{1,2})\b|(\d{1,2})\s*(?:years?|yrs?)(?:\s*old)?\b)")
        .expect("age regex should compile")
});

static LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:from|in|lives in)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)")
        .expect("location regex should compile")
});

static GIFT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:wants|want|would like|wishes for|wish for|asks for|asking for|dreams of)\s+(.+?)\s*(?:[.!?\n]|$)",
    )
    .expect("gift regex should compile")
});

const COLORS: [&str; 12] = [
    "red", "blue", "green", "yellow", "pink", "purple", "orange", "black", "white", "silver",
    "gold", "brown",
];

const PURCHASE_KEYWORDS: [&str; 8] = [
    "gift card",
    "video game",
    "phone",
    "tablet",
    "console",
    "laptop",
    "headphones",
    "store-bought",
];

const INFEASIBLE_KEYWORDS: [&str; 6] = ["puppy", "kitten", "pony", "real dragon", "live ", "alive"];

/// Keyword groups and the artisans they call for, in production order.
const TRADE_RULES: [(&[&str], &[&str]); 14] = [
    (&["car", "truck", "train", "vehicle", "boat", "plane", "rocket"], &["3d_printer_elf", "mechanic_elf"]),
    (&["remote", "rc ", "battery", "electric", "motor"], &["electronics_elf", "battery_elf"]),
    (&["robot", "game", "app", "computer", "program"], &["electronics_elf", "software_elf"]),
    (&["wood", "rocking", "dollhouse", "doll house", "blocks", "puzzle"], &["woodworker_elf"]),
    (&["teddy", "plush", "bear", "stuffed", "doll", "costume"], &["fabric_elf"]),
    (&["bike", "bicycle", "scooter", "metal", "sword", "shield"], &["blacksmith_elf", "welding_elf"]),
    (&["bag", "wallet", "leather", "belt", "backpack"], &["leather_elf"]),
    (&["glass", "marble", "snow globe"], &["glass_elf"]),
    (&["mug", "ceramic", "vase", "pottery"], &["ceramics_elf"]),
    (&["music", "guitar", "drum", "piano", "sound", "speaker"], &["sound_engineer_elf"]),
    (&["light", "lamp", "led", "glow", "star projector"], &["light_designer_elf"]),
    (&["personalized", "personalised", "engraved", "with my name"], &["engraver_elf"]),
    (&["sticker", "decal", "racing stripes"], &["decal_elf"]),
    (&["shiny", "polished", "jewelry", "jewellery", "necklace"], &["polish_elf"]),
];

/// What the reception role understood from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intake {
    pub subject: Option<SubjectInfo>,
    pub gift: String,
}

/// Pull subject metadata and the gift description out of free text.
pub fn read_request(request: &str) -> Intake {
    let name = NAME
        .captures(request)
        .or_else(|| LEADING_NAME.captures(request))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let age = AGE
        .captures(request)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .and_then(|m| m.as_str().parse().ok());
    let location = LOCATION
        .captures(request)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let gift = GIFT
        .captures(request)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| request.trim().to_string());

    Intake {
        subject: name.map(|name| SubjectInfo {
            name,
            age,
            location,
        }),
        gift,
    }
}

/// First color word mentioned in `text`, if any.
pub fn color_of(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    COLORS
        .into_iter()
        .find(|c| lower.split(|ch: char| !ch.is_alphanumeric()).any(|w| w == *c))
}

/// Decide feasibility, manufacture-vs-purchase and the artisan line-up.
pub fn plan_design(gift: &str) -> DesignUpdate {
    let lower = format!("{} ", gift.to_lowercase());

    if INFEASIBLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DesignUpdate {
            feasibility: Feasibility::Infeasible,
            fulfilment: Fulfilment::Pending,
            design_document: format!("Cannot be made in the workshop: {gift}"),
            bill_of_materials: Vec::new(),
            required_roles: Vec::new(),
        };
    }

    if PURCHASE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DesignUpdate {
            feasibility: Feasibility::Feasible,
            fulfilment: Fulfilment::Purchase,
            design_document: format!("Source a ready-made {gift} from a trusted supplier."),
            bill_of_materials: vec![BomEntry {
                name: gift.to_string(),
                quantity: 1,
                material: "retail".into(),
                specification: "new, sealed, age-appropriate".into(),
            }],
            required_roles: Vec::new(),
        };
    }

    let mut roles: Vec<&str> = Vec::new();
    for (keywords, trades) in TRADE_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            for trade in trades {
                if !roles.contains(trade) {
                    roles.push(trade);
                }
            }
        }
    }
    if roles.is_empty() {
        roles.push("woodworker_elf");
    }
    if color_of(gift).is_some() && !roles.contains(&"painter_elf") {
        roles.push("painter_elf");
    }
    roles.push(LIBRARIAN);

    let bill_of_materials = roles
        .iter()
        .filter_map(|r| artisans::trade(r))
        .filter(|t| t.makes_component())
        .map(|t| BomEntry {
            name: t.component_type.to_string(),
            quantity: 1,
            material: t.material.to_string(),
            specification: t.dimensions.to_string(),
        })
        .collect::<Vec<_>>();

    let steps = bill_of_materials
        .iter()
        .enumerate()
        .map(|(i, b)| format!("{}. {} in {}", i + 1, b.name, b.material))
        .collect::<Vec<_>>()
        .join("; ");

    DesignUpdate {
        feasibility: Feasibility::Feasible,
        fulfilment: Fulfilment::Manufacture,
        design_document: format!("Blueprint for {gift}: {steps}"),
        bill_of_materials,
        required_roles: roles.into_iter().map(str::to_string).collect(),
    }
}
