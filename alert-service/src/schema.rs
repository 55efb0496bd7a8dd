diesel::table! {
    alert_products (id) {
        id -> Int4,
        shop -> Varchar,
        product_id -> Varchar,
        variant_id -> Varchar,
        inventory_item -> Varchar,
        threshold -> Int4,
        alert_frequency -> Varchar,
        is_triggered -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}
