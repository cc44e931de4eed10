//! SCS modem catalog
//!
//! SCS modems enumerate with the FTDI vendor id and a product id from the
//! block `0xD010..=0xD017`. The low three bits of the product id select the
//! model; the table below is indexed by that model code.
//!
//! | PID      | Model               |
//! |----------|---------------------|
//! | `0xD010` | PTC-IIusb           |
//! | `0xD011` | Tracker / DSP TNC   |
//! | `0xD012` | P4dragon DR-7800    |
//! | `0xD013` | P4dragon DR-7400    |
//! | `0xD014` | not used            |
//! | `0xD015` | PTC-IIIusb          |
//! | `0xD016` | not used            |
//! | `0xD017` | not used            |

/// USB vendor id (FTDI) used by all SCS modems
pub const SCS_VENDOR_ID: u16 = 0x0403;

/// First product id of the block reserved for SCS modems
pub const SCS_PRODUCT_BLOCK: u16 = 0xD010;

/// Bits of the product id that must equal [`SCS_PRODUCT_BLOCK`]
pub const SCS_PRODUCT_MASK: u16 = 0xFFF8;

/// Bits of the product id that carry the model code
pub const MODEL_CODE_MASK: u16 = 0x0007;

/// Static description of one modem model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    /// Index into [`MODELS`]
    pub model_code: u8,
    /// Display name, empty for unused product ids
    pub display_name: &'static str,
    /// Nominal baud rate of the USB serial link, 0 for unused product ids
    pub nominal_baud: u32,
}

impl ModelProfile {
    const fn new(model_code: u8, display_name: &'static str, nominal_baud: u32) -> Self {
        Self {
            model_code,
            display_name,
            nominal_baud,
        }
    }

    /// Whether this code names an actual product
    pub fn is_known(&self) -> bool {
        !self.display_name.is_empty()
    }
}

/// All model profiles, indexed by model code
pub static MODELS: [ModelProfile; 8] = [
    ModelProfile::new(0, "PTC-IIusb", 115_200),
    ModelProfile::new(1, "Tracker / DSP TNC", 38_400),
    ModelProfile::new(2, "P4dragon DR-7800", 829_440),
    ModelProfile::new(3, "P4dragon DR-7400", 829_440),
    ModelProfile::new(4, "", 0),
    ModelProfile::new(5, "PTC-IIIusb", 115_200),
    ModelProfile::new(6, "", 0),
    ModelProfile::new(7, "", 0),
];

/// Check whether a vendor/product pair belongs to an SCS modem
pub fn is_scs_modem(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == SCS_VENDOR_ID && (product_id & SCS_PRODUCT_MASK) == SCS_PRODUCT_BLOCK
}

/// Extract the model code from a product id
pub fn model_code(product_id: u16) -> u8 {
    (product_id & MODEL_CODE_MASK) as u8
}

/// Look up a model profile
///
/// Only the low three bits of `code` are used, so every code maps to an
/// entry.
pub fn profile(code: u8) -> &'static ModelProfile {
    &MODELS[(code as u16 & MODEL_CODE_MASK) as usize]
}
