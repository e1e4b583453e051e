use mongodb::bson::doc;

use crate::core::indexer::IndexManager;
use crate::types::index::{IndexSpec, IndexSpecOptions};

/// Register every index the marketplace backend relies on.
pub fn register_indexes(manager: IndexManager) -> IndexManager {
    manager
        // User
        .add("User", IndexSpec::new().ascending("primary_email").name("user_email_unique").unique())
        .add("User", IndexSpec::new().ascending("login_name").name("user_login_name_unique").unique())
        .add(
            "User",
            IndexSpec::new()
                .ascending("phone")
                .name("user_phone_unique")
                .unique()
                .partial_filter(doc! { "phone": { "$type": "string" } }),
        )
        .add("User", IndexSpec::new().ascending("status").descending("created_at").name("user_status_created"))
        // Shop
        .add("Shop", IndexSpec::new().ascending("slug").name("shop_slug_unique").unique())
        .add("Shop", IndexSpec::new().ascending("user_id").name("shop_owner"))
        .add_text("Shop", ["name", "description"])
        // Listing
        .add(
            "Listing",
            IndexSpec::new()
                .ascending("shop_id")
                .ascending("state")
                .descending("created_at")
                .name("listing_shop_state"),
        )
        .add("Listing", IndexSpec::new().ascending("category").descending("created_at").name("listing_category_recent"))
        .add("Listing", IndexSpec::new().ascending("price").name("listing_price"))
        .add_text("Listing", ["title", "description", "tags"])
        // Cart
        .add_compound(
            "Cart",
            ["user_id", "listing_id"],
            Some(IndexSpecOptions {
                name: Some("cart_user_listing_unique".to_string()),
                unique: Some(true),
                ..Default::default()
            }),
        )
        // Review
        .add("Review", IndexSpec::new().ascending("listing_id").descending("created_at").name("review_listing_recent"))
        .add_compound(
            "Review",
            ["user_id", "listing_id"],
            Some(IndexSpecOptions {
                name: Some("review_user_listing_unique".to_string()),
                unique: Some(true),
                ..Default::default()
            }),
        )
        // Favorite
        .add_compound(
            "Favorite",
            ["user_id", "listing_id"],
            Some(IndexSpecOptions {
                name: Some("favorite_user_listing_unique".to_string()),
                unique: Some(true),
                ..Default::default()
            }),
        )
        // ShippingProfile
        .add("ShippingProfile", IndexSpec::new().ascending("shop_id").name("shipping_profile_shop"))
        // Payment
        .add("Payment", IndexSpec::new().ascending("reference").name("payment_reference_unique").unique())
        .add("Payment", IndexSpec::new().ascending("user_id").descending("created_at").name("payment_user_recent"))
        // Notification
        .add(
            "Notification",
            IndexSpec::new().ascending("user_id").ascending("read").descending("created_at").name("notification_inbox"),
        )
        // Session
        .add("Session", IndexSpec::new().ascending("token").name("session_token_unique").unique())
        .add("Session", IndexSpec::new().ascending("user_id").name("session_user").background())
}
