use crate::domain::order::{InvoiceHeader, InvoiceLine, OrderDetails, PaymentMethod, Tender};
use crate::error::{RelayError, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Scalars in branch payloads arrive as strings or as bare numbers depending on the POS build.
fn flex_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Number(number) => number.to_string(),
        Scalar::Null(()) => String::new(),
    })
}

/// The `stat` block every branch file starts with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusBlock {
    #[serde(default, deserialize_with = "flex_string")]
    pub branch_code: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub company_code: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub detail_count: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub payment_count: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub record: String,
    /// Business date, `YYYYMMDD`.
    #[serde(deserialize_with = "flex_string")]
    pub sysdate: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "flex_string")]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    stat: StatusBlock,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(deserialize_with = "flex_string")]
    branch_cd: String,
    #[serde(deserialize_with = "flex_string")]
    sys_trans_num: String,
    #[serde(default, deserialize_with = "flex_string")]
    cd_first_name: String,
    #[serde(default, deserialize_with = "flex_string")]
    cd_last_name: String,
    #[serde(default, deserialize_with = "flex_string")]
    cd_addr: String,
    #[serde(default, deserialize_with = "flex_string")]
    cd_mobilenumber: String,
}

#[derive(Debug, Deserialize)]
struct RawDetail {
    #[serde(deserialize_with = "flex_string")]
    sys_trans_num: String,
    #[serde(deserialize_with = "flex_string")]
    seq_num: String,
    #[serde(deserialize_with = "flex_string")]
    item_code: String,
    #[serde(deserialize_with = "flex_string")]
    qty: String,
    #[serde(default, deserialize_with = "flex_string")]
    sell_uom: String,
    #[serde(default, deserialize_with = "flex_string")]
    cost: String,
    #[serde(default, deserialize_with = "flex_string")]
    net_retail: String,
}

#[derive(Debug, Deserialize)]
struct RawPayment {
    #[serde(deserialize_with = "flex_string")]
    sys_trans_num: String,
    #[serde(default, deserialize_with = "flex_string")]
    ref_num: String,
    #[serde(deserialize_with = "flex_string")]
    tender_type_code: String,
    #[serde(deserialize_with = "flex_string")]
    conv_pay_amount_due: String,
    #[serde(deserialize_with = "flex_string")]
    conv_change_amount: String,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    hdr: RawHeader,
    detail: Vec<RawDetail>,
    payment: Vec<RawPayment>,
}

/// Outcome of transforming one branch file.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    /// The business date is outside the target month; the file is left for later.
    OutOfRange { sysdate: String },
    Order(OrderDetails),
}

/// `true` when `sysdate` (`YYYYMMDD`) falls in `month`. Unparseable dates never match.
pub fn is_month_in_range(sysdate: &str, month: u32) -> bool {
    NaiveDate::parse_from_str(sysdate.trim(), "%Y%m%d")
        .map(|date| date.month() == month)
        .unwrap_or(false)
}

/// Turns a branch's raw JSON payload into the canonical [`OrderDetails`].
#[derive(Debug, Clone, Copy)]
pub struct OrderTransformer {
    target_month: u32,
}

impl OrderTransformer {
    pub fn new(target_month: u32) -> Self {
        Self { target_month }
    }

    /// Decodes only the `stat` block.
    pub fn status(payload: &[u8]) -> Result<StatusBlock> {
        let envelope: StatusEnvelope = serde_json::from_slice(payload)
            .map_err(|e| RelayError::Parse(format!("invalid status block: {e}")))?;
        Ok(envelope.stat)
    }

    /// Checks the business date first and only decodes the order when it is in range.
    pub fn transform(&self, payload: &[u8]) -> Result<Transformed> {
        let status = Self::status(payload)?;
        if !is_month_in_range(&status.sysdate, self.target_month) {
            return Ok(Transformed::OutOfRange {
                sysdate: status.sysdate,
            });
        }

        let raw: RawOrder = serde_json::from_slice(payload)
            .map_err(|e| RelayError::Parse(format!("invalid order payload: {e}")))?;
        map_order(raw).map(Transformed::Order)
    }
}

fn parse_amount(field: &str, value: &str) -> Result<Decimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .map_err(|e| RelayError::Parse(format!("{field} '{value}' is not a number: {e}")))
}

fn map_order(raw: RawOrder) -> Result<OrderDetails> {
    let header = InvoiceHeader {
        customer_no: raw.hdr.branch_cd,
        source_order_id: raw.hdr.sys_trans_num,
        customer_name: format!("{} {}", raw.hdr.cd_first_name, raw.hdr.cd_last_name),
        address: raw.hdr.cd_addr,
        phone_no: raw.hdr.cd_mobilenumber,
    };
    if header.source_order_id.trim().is_empty() {
        return Err(RelayError::Parse(
            "header has no transaction number".to_string(),
        ));
    }

    let invoice_line = raw
        .detail
        .into_iter()
        .map(|detail| InvoiceLine {
            source_line_id: format!("{}-{}", detail.sys_trans_num, detail.seq_num),
            source_order_id: detail.sys_trans_num,
            item_no: detail.item_code,
            variant_code: String::new(),
            quantity: detail.qty,
            unit_of_measure: detail.sell_uom,
            unit_cost: detail.cost,
            price: detail.net_retail,
        })
        .collect();

    let payment_method = raw
        .payment
        .into_iter()
        .map(|payment| {
            let due = parse_amount("conv_pay_amount_due", &payment.conv_pay_amount_due)?;
            let change = parse_amount("conv_change_amount", &payment.conv_change_amount)?;
            Ok(PaymentMethod {
                source_order_id: payment.sys_trans_num,
                tender_type: vec![Tender {
                    reference: payment.ref_num,
                    code: payment.tender_type_code,
                    amount: due - change,
                }],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(OrderDetails {
        invoice_header: vec![header],
        invoice_line,
        payment_method,
    })
}
