//! Stimulus attribute model.
//!
//! A stimulus is a character profile: race, gender, attire and the object held in
//! hand. Whether the profile is a threat is derived from the held object when the
//! attribute set is built and can never drift from it afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Race {
    White,
    Black,
    Asian,
    Latino,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attire {
    Suit,
    Hoodie,
    #[serde(rename = "Police Uniform")]
    Uniform,
    #[serde(rename = "Traditional Clothing")]
    Traditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeldObject {
    #[serde(rename = "Handgun")]
    Gun,
    #[serde(rename = "Smartphone")]
    Phone,
    #[serde(rename = "Black Wallet")]
    Wallet,
    Camera,
}

pub const RACES: [Race; 4] = [Race::White, Race::Black, Race::Asian, Race::Latino];
pub const GENDERS: [Gender; 2] = [Gender::Male, Gender::Female];
pub const ATTIRES: [Attire; 4] = [Attire::Suit, Attire::Hoodie, Attire::Uniform, Attire::Traditional];
pub const THREAT_OBJECTS: [HeldObject; 1] = [HeldObject::Gun];
pub const NON_THREAT_OBJECTS: [HeldObject; 3] = [HeldObject::Phone, HeldObject::Wallet, HeldObject::Camera];

impl Race {
    pub fn label(&self) -> &'static str {
        match self {
            Race::White => "White",
            Race::Black => "Black",
            Race::Asian => "Asian",
            Race::Latino => "Latino",
        }
    }
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl Attire {
    pub fn label(&self) -> &'static str {
        match self {
            Attire::Suit => "Suit",
            Attire::Hoodie => "Hoodie",
            Attire::Uniform => "Police Uniform",
            Attire::Traditional => "Traditional Clothing",
        }
    }
}

impl HeldObject {
    pub fn label(&self) -> &'static str {
        match self {
            HeldObject::Gun => "Handgun",
            HeldObject::Phone => "Smartphone",
            HeldObject::Wallet => "Black Wallet",
            HeldObject::Camera => "Camera",
        }
    }

    pub fn is_threat(&self) -> bool {
        THREAT_OBJECTS.contains(self)
    }
}

macro_rules! display_via_label {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

display_via_label!(Race, Gender, Attire, HeldObject);

/// Attribute payload whose threat flag disagrees with its held object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeError {
    pub held_object: HeldObject,
    pub claimed_threat: bool,
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threat flag {} contradicts held object {}",
            self.claimed_threat, self.held_object
        )
    }
}

impl std::error::Error for AttributeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AttributesRepr")]
pub struct StimulusAttributes {
    race: Race,
    gender: Gender,
    attire: Attire,
    #[serde(rename = "object")]
    held_object: HeldObject,
    #[serde(rename = "isThreat")]
    is_threat: bool,
}

#[derive(Deserialize)]
struct AttributesRepr {
    race: Race,
    gender: Gender,
    attire: Attire,
    #[serde(rename = "object")]
    held_object: HeldObject,
    // older asset caches were written in snake_case
    #[serde(rename = "isThreat", alias = "is_threat")]
    is_threat: bool,
}

impl TryFrom<AttributesRepr> for StimulusAttributes {
    type Error = AttributeError;

    fn try_from(raw: AttributesRepr) -> Result<Self, Self::Error> {
        let attrs = StimulusAttributes::new(raw.race, raw.gender, raw.attire, raw.held_object);
        if attrs.is_threat != raw.is_threat {
            return Err(AttributeError {
                held_object: raw.held_object,
                claimed_threat: raw.is_threat,
            });
        }
        Ok(attrs)
    }
}

impl StimulusAttributes {
    pub fn new(race: Race, gender: Gender, attire: Attire, held_object: HeldObject) -> Self {
        Self {
            race,
            gender,
            attire,
            held_object,
            is_threat: held_object.is_threat(),
        }
    }

    pub fn race(&self) -> Race {
        self.race
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn attire(&self) -> Attire {
        self.attire
    }

    pub fn held_object(&self) -> HeldObject {
        self.held_object
    }

    pub fn is_threat(&self) -> bool {
        self.is_threat
    }
}

/// A stimulus ready to be shown. `visual` is an opaque reference understood by the
/// renderer (a file path for generated images); `None` selects fallback rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub attributes: StimulusAttributes,
    pub visual: Option<String>,
}

impl Card {
    pub fn new(id: impl Into<String>, attributes: StimulusAttributes, visual: Option<String>) -> Self {
        Self {
            id: id.into(),
            attributes,
            visual,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.visual.is_none()
    }
}
