// Fact tables of the `maker` schema are addressed dynamically through
// `InsertionModel`s and are not listed here.

diesel::table! {
    addresses (id) {
        id -> Int8,
        address -> Text,
    }
}

diesel::table! {
    checked_headers (id) {
        id -> Int8,
        header_id -> Int8,
        label -> Text,
        check_count -> Int4,
    }
}

diesel::table! {
    headers (id) {
        id -> Int8,
        block_number -> Int8,
        hash -> Text,
        block_timestamp -> Int8,
    }
}

diesel::table! {
    maker.ilks (id) {
        id -> Int8,
        ilk -> Text,
        identifier -> Text,
    }
}

diesel::joinable!(checked_headers -> headers (header_id));

diesel::allow_tables_to_appear_in_same_query!(addresses, checked_headers, headers, ilks,);
