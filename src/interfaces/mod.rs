//! Wire formats: branch JSON payloads, OData responses and CSV ledgers.

pub mod csv {
    pub mod ledger_codec;
}

pub mod json {
    pub mod odata;
    pub mod order_reader;
}
