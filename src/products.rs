//! Product name lookup by device category and subcategory.

use crate::types::ProductInfo;

const fn product(name: &'static str, sku: &'static str) -> ProductInfo {
    ProductInfo {
        name,
        product: Some(sku),
    }
}

const fn category(name: &'static str) -> ProductInfo {
    ProductInfo {
        name,
        product: None,
    }
}

/// `(category, subcategory, info)`; subcategory 0 is the category default.
static PRODUCTS: &[(u8, u8, ProductInfo)] = &[
    (0x00, 0x00, category("Generalized Controller")),
    (0x00, 0x04, product("ControLinc", "2430")),
    (0x00, 0x05, product("RemoteLinc", "2440")),
    (0x00, 0x06, product("Icon Tabletop Controller", "2830")),
    (0x00, 0x10, product("Mini Remote - 4 Scene", "2444A2")),
    (0x00, 0x11, product("Mini Remote - Switch", "2444A3")),
    (0x00, 0x12, product("Mini Remote - 8 Scene", "2444A2")),
    (0x01, 0x00, category("Dimmable Lighting Control")),
    (0x01, 0x01, product("SwitchLinc Dimmer 600W", "2476D")),
    (0x01, 0x0e, product("LampLinc Dual-Band", "2457D2")),
    (0x01, 0x1a, product("ToggleLinc Dimmer", "2466D")),
    (0x01, 0x20, product("SwitchLinc Dimmer Dual-Band", "2477D")),
    (0x01, 0x2e, product("FanLinc", "2475F")),
    (0x01, 0x32, product("In-LineLinc Dimmer", "2475DA1")),
    (0x01, 0x3a, product("LED Bulb", "2672-222")),
    (0x01, 0x41, product("KeypadLinc Dimmer - 8 Button", "2334-2")),
    (0x01, 0x42, product("KeypadLinc Dimmer - 6 Button", "2334-2")),
    (0x02, 0x00, category("Switched Lighting Control")),
    (0x02, 0x09, product("ApplianceLinc", "2456S3")),
    (0x02, 0x1a, product("ToggleLinc Relay", "2466S")),
    (0x02, 0x2a, product("SwitchLinc Relay Dual-Band", "2477S")),
    (0x02, 0x2c, product("KeypadLinc Relay", "2487S")),
    (0x02, 0x2f, product("Micro Module On/Off", "2443-222")),
    (0x02, 0x37, product("On/Off Module", "2635-222")),
    (0x02, 0x39, product("On/Off Outlet", "2663-222")),
    (0x03, 0x00, category("Network Bridge")),
    (0x03, 0x05, product("PowerLinc Modem Serial", "2412S")),
    (0x03, 0x0b, product("PowerLinc Modem USB", "2413U")),
    (0x03, 0x15, product("PowerLinc Modem Serial Dual-Band", "2413S")),
    (0x03, 0x20, product("PowerLinc Modem USB Dual-Band", "2413U")),
    (0x03, 0x33, product("Hub", "2245-222")),
    (0x04, 0x00, category("Irrigation Control")),
    (0x04, 0x01, product("EZRain Sprinkler Controller", "EZRain")),
    (0x05, 0x00, category("Climate Control")),
    (0x05, 0x0b, product("Thermostat", "2441TH")),
    (0x05, 0x10, product("Wireless Thermostat", "2441ZTH")),
    (0x06, 0x00, category("Pool and Spa Control")),
    (0x07, 0x00, category("Sensors and Actuators")),
    (0x07, 0x1a, product("I/O Linc", "2450")),
    (0x08, 0x00, category("Home Entertainment")),
    (0x09, 0x00, category("Energy Management")),
    (0x09, 0x0a, product("Load Controller", "2477SA1")),
    (0x0a, 0x00, category("Built-In Appliance Control")),
    (0x0b, 0x00, category("Plumbing")),
    (0x0c, 0x00, category("Communication")),
    (0x0d, 0x00, category("Computer Control")),
    (0x0e, 0x00, category("Window Coverings")),
    (0x0e, 0x01, product("Micro Module Open/Close", "2444-222")),
    (0x0f, 0x00, category("Access Control")),
    (0x0f, 0x06, product("MorningLinc", "2458A1")),
    (0x10, 0x00, category("Security, Health and Safety")),
    (0x10, 0x01, product("Motion Sensor", "2842-222")),
    (0x10, 0x02, product("TriggerLinc", "2421")),
    (0x10, 0x08, product("Leak Sensor", "2852-222")),
    (0x10, 0x0a, product("Smoke Bridge", "2982-222")),
    (0x10, 0x11, product("Hidden Door Sensor", "2845-222")),
    (0x11, 0x00, category("Surveillance")),
    (0x12, 0x00, category("Automotive")),
    (0x13, 0x00, category("Pet Care")),
    (0x14, 0x00, category("Toys")),
    (0x15, 0x00, category("Timekeeping")),
    (0x16, 0x00, category("Holiday")),
];

/// Looks up a product, falling back to the category's default entry.
///
/// Returns `None` for unknown categories.
#[must_use]
pub fn lookup(cat: u8, subcategory: u8) -> Option<ProductInfo> {
    let find = |sub: u8| {
        PRODUCTS
            .iter()
            .find(|(c, s, _)| *c == cat && *s == sub)
            .map(|(_, _, info)| *info)
    };
    find(subcategory).or_else(|| find(0))
}
