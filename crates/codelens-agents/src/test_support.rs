use codelens_core::{ClassRecord, EntitySnapshotFile, MethodRecord, PackageRecord, Vocabulary};
use codelens_registry::{EntityRegistry, InMemorySource};
use std::sync::Arc;

fn class(id: &str, name: &str) -> ClassRecord {
    ClassRecord {
        id: id.into(),
        name: name.into(),
        fully_qualified_name: format!("com.acme.billing.{}", name),
        package: "com.acme.billing".into(),
        ..Default::default()
    }
}

fn method(id: &str, name: &str, class_name: &str) -> MethodRecord {
    MethodRecord {
        id: id.into(),
        name: name.into(),
        signature: format!("{}()", name),
        class_name: class_name.into(),
        package: "com.acme.billing".into(),
        ..Default::default()
    }
}

pub(crate) fn payment_data() -> EntitySnapshotFile {
    EntitySnapshotFile {
        classes: vec![
            class("c1", "PaymentService"),
            class("c2", "PaymentController"),
            class("c3", "UserCreationService"),
            class("c4", "OrderLineItem"),
            class("c5", "BillingService"),
            class("c6", "InvoiceRepository"),
            class("c7", "AccountManager"),
        ],
        methods: vec![
            method("m1", "processPayment", "PaymentService"),
            method("m2", "getAmount", "PaymentService"),
            method("m3", "validateUser", "UserCreationService"),
            method("m4", "findInvoice", "InvoiceRepository"),
        ],
        packages: vec![PackageRecord {
            name: "com.acme.billing".into(),
            class_names: vec!["PaymentService".into(), "BillingService".into()],
        }],
    }
}

/// Registry loaded with a small billing domain.
pub(crate) async fn payment_registry() -> Arc<EntityRegistry> {
    let source = Arc::new(InMemorySource::new(payment_data()));
    Arc::new(EntityRegistry::load(source, Vocabulary::default()).await)
}
