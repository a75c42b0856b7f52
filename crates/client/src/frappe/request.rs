//! Whitelisted method paths and their argument bodies.
//!
//! Document arguments are sent as JSON-encoded strings, which is what the
//! server-side methods decode.

use posa_offline_core::InvoiceEntry;
use serde_json::{Map, Value, json};

pub const SUBMIT_INVOICE: &str = "posawesome.posawesome.api.invoices.submit_invoice";
pub const UPDATE_INVOICE: &str = "posawesome.posawesome.api.invoices.update_invoice";
pub const CREATE_CUSTOMER: &str = "posawesome.posawesome.api.customers.create_customer";
pub const PROCESS_PAYMENT: &str = "posawesome.posawesome.api.payment_entry.process_pos_payment";
pub const GET_ITEMS_DETAILS: &str = "posawesome.posawesome.api.items.get_items_details";

pub fn submit_invoice(entry: &InvoiceEntry) -> Value {
    json!({
        "invoice": entry.invoice.to_string(),
        "data": entry.data.to_string(),
    })
}

pub fn update_invoice(invoice: &Value) -> Value {
    json!({ "data": invoice.to_string() })
}

/// Customer fields are the method's own keyword arguments.
pub fn create_customer(customer: &Value) -> Value {
    match customer {
        Value::Object(fields) => Value::Object(fields.clone()),
        other => Value::Object(Map::from_iter([("customer_name".to_string(), other.clone())])),
    }
}

pub fn process_payment(payment: &Value) -> Value {
    json!({ "payment": payment.to_string() })
}

pub fn get_items_details(item_codes: &[String], pos_profile: &str) -> Value {
    let items: Vec<Value> = item_codes.iter().map(|code| json!({ "item_code": code })).collect();
    json!({
        "pos_profile": json!({ "name": pos_profile }).to_string(),
        "items_data": Value::Array(items).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_args_are_encoded_strings() {
        let entry = InvoiceEntry::new(json!({"customer": "Walk-in"}), json!({"redeemed_customer_credit": 0}));
        let args = submit_invoice(&entry);
        let invoice: Value = serde_json::from_str(args["invoice"].as_str().unwrap()).unwrap();
        assert_eq!(invoice, json!({"customer": "Walk-in"}));
        assert!(args["data"].is_string());
    }

    #[test]
    fn test_items_details_args() {
        let args = get_items_details(&["A".into(), "B".into()], "Main POS");
        let items: Value = serde_json::from_str(args["items_data"].as_str().unwrap()).unwrap();
        assert_eq!(items, json!([{"item_code": "A"}, {"item_code": "B"}]));
        let profile: Value = serde_json::from_str(args["pos_profile"].as_str().unwrap()).unwrap();
        assert_eq!(profile["name"], "Main POS");
    }

    #[test]
    fn test_customer_args_pass_fields_through() {
        let args = create_customer(&json!({"customer_name": "Jane", "mobile_no": "555"}));
        assert_eq!(args, json!({"customer_name": "Jane", "mobile_no": "555"}));
        assert_eq!(create_customer(&json!("Jane")), json!({"customer_name": "Jane"}));
    }
}
