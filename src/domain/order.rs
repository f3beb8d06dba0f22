use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The canonical order submitted to Business Central.
///
/// Built once per source file by the order transformer and never mutated
/// afterwards. Field names on the wire follow the accounting API's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(rename = "Invoice_header")]
    pub invoice_header: Vec<InvoiceHeader>,
    #[serde(rename = "Invoice_line")]
    pub invoice_line: Vec<InvoiceLine>,
    #[serde(rename = "payment_method")]
    pub payment_method: Vec<PaymentMethod>,
}

impl OrderDetails {
    /// External transaction id carried by the first header, or `""` if there is none.
    pub fn transaction_id(&self) -> &str {
        self.invoice_header
            .first()
            .map(|header| header.source_order_id.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    /// Customer number; branches bill under their own branch code.
    #[serde(rename = "CustNo")]
    pub customer_no: String,
    #[serde(rename = "kti_sourceSalesOrderid")]
    pub source_order_id: String,
    #[serde(rename = "customername")]
    pub customer_name: String,
    pub address: String,
    #[serde(rename = "phoneno")]
    pub phone_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    #[serde(rename = "kti_sourceSalesOrderid")]
    pub source_order_id: String,
    #[serde(rename = "ItemNo")]
    pub item_no: String,
    #[serde(rename = "VariantCode")]
    pub variant_code: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "UnitofMeasureCode")]
    pub unit_of_measure: String,
    /// `<transaction id>-<sequence number>`, unique per line.
    #[serde(rename = "kti_sourcesalesorderitemid")]
    pub source_line_id: String,
    #[serde(rename = "UnitCost")]
    pub unit_cost: String,
    #[serde(rename = "Price")]
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    #[serde(rename = "kti_sourceSalesOrderid")]
    pub source_order_id: String,
    #[serde(rename = "tender_type")]
    pub tender_type: Vec<Tender>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    #[serde(rename = "TRN")]
    pub reference: String,
    pub code: String,
    /// Amount due minus change given.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> OrderDetails {
        OrderDetails {
            invoice_header: vec![InvoiceHeader {
                customer_no: "B001".to_string(),
                source_order_id: "TRN-001".to_string(),
                customer_name: "Juan Cruz".to_string(),
                address: "Manila".to_string(),
                phone_no: "0917".to_string(),
            }],
            invoice_line: vec![],
            payment_method: vec![PaymentMethod {
                source_order_id: "TRN-001".to_string(),
                tender_type: vec![Tender {
                    reference: "R1".to_string(),
                    code: "CASH".to_string(),
                    amount: dec!(450),
                }],
            }],
        }
    }

    #[test]
    fn test_transaction_id_comes_from_first_header() {
        assert_eq!(order().transaction_id(), "TRN-001");

        let mut empty = order();
        empty.invoice_header.clear();
        assert_eq!(empty.transaction_id(), "");
    }

    #[test]
    fn test_serializes_with_accounting_field_names() {
        let json = serde_json::to_value(order()).unwrap();
        assert_eq!(json["Invoice_header"][0]["kti_sourceSalesOrderid"], "TRN-001");
        assert_eq!(json["Invoice_header"][0]["CustNo"], "B001");
        assert_eq!(json["payment_method"][0]["tender_type"][0]["TRN"], "R1");
        assert_eq!(json["payment_method"][0]["tender_type"][0]["amount"], 450.0);
    }
}
