diesel::table! {
    users (id) {
        id -> BigInt,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        created_at -> BigInt,
    }
}

diesel::table! {
    travel_plans (id) {
        id -> BigInt,
        user_id -> BigInt,
        title -> Text,
        plan_data -> Text,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}

diesel::table! {
    expenses (id) {
        id -> BigInt,
        plan_id -> BigInt,
        user_id -> BigInt,
        category -> Text,
        amount -> Double,
        description -> Text,
        date -> Text,
        created_at -> BigInt,
    }
}
