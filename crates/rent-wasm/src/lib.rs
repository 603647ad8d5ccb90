//! # rent-wasm
//!
//! WebAssembly bindings for the rent payment page.
//!
//! This crate provides WASM-compatible functions for:
//! - Normalizing phone numbers before they are shown or sent
//! - Validating the payment form and building the push request body
//! - Formatting amounts for display
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { normalize_phone, payment_request_body } from 'rent-wasm';
//!
//! await init();
//!
//! const body = payment_request_body('1500', '0712 345 678');
//! // {"amount":"1500","phone_number":"254712345678"}
//! ```
//!
//! ## Building
//!
//! ```bash
//! wasm-pack build --target web
//! ```

use rent_core::{phone, PaymentRequest};
use rust_decimal::Decimal;
use std::str::FromStr;
use wasm_bindgen::prelude::*;

/// Normalize a phone number to the `254...` form
#[wasm_bindgen]
pub fn normalize_phone(raw: &str) -> String {
    phone::normalize(raw)
}

/// Validate the form inputs and return the JSON body for the push request
#[wasm_bindgen]
pub fn payment_request_body(amount: &str, raw_phone: &str) -> Result<String, JsValue> {
    let request = build_request(amount, raw_phone).map_err(|e| JsValue::from_str(&e))?;
    serde_json::to_string(&request).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Format an amount for display, e.g. `KES 1500.00`
#[wasm_bindgen]
pub fn format_amount(amount: &str) -> Result<String, JsValue> {
    parse_amount(amount)
        .map(|d| format!("KES {:.2}", d))
        .map_err(|e| JsValue::from_str(&e))
}

/// Log to browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Get library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn parse_amount(amount: &str) -> Result<Decimal, String> {
    Decimal::from_str(amount.trim()).map_err(|_| format!("Invalid amount: {:?}", amount))
}

fn build_request(amount: &str, raw_phone: &str) -> Result<PaymentRequest, String> {
    PaymentRequest::new(parse_amount(amount)?, raw_phone).map_err(|e| e.to_string())
}
