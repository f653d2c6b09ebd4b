use super::{HookError, LifecycleEvent, LifecycleHook, RequestScope};

/// Logs every committed profile creation.
pub struct SaveProfileHook;

impl LifecycleHook for SaveProfileHook {
    fn execute(&self, event: &LifecycleEvent, scope: &RequestScope) -> Result<(), HookError> {
        let name = event
            .resource
            .attributes
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        tracing::info!(
            id = %event.resource.id,
            name = %name,
            request_id = %scope.request_id,
            "saved profile"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::datastore::Resource;
    use crate::hooks::{Operation, TransactionPhase};
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Log sink for asserting on emitted lines.
    #[derive(Clone, Default)]
    pub(crate) struct Captured(pub Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn logs_profile_id_once() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();

        let attributes = json!({ "name": "Grace" }).as_object().cloned().unwrap();
        let event = LifecycleEvent {
            model: "profiles".into(),
            operation: Operation::Create,
            phase: TransactionPhase::PostCommit,
            resource: Resource::new("profiles", "7b0c7c9e-0000-4000-8000-000000000001", attributes),
        };
        tracing::subscriber::with_default(subscriber, || {
            SaveProfileHook.execute(&event, &RequestScope::new("/api/v1/profiles")).unwrap();
        });

        let text = captured.text();
        assert_eq!(text.matches("saved profile").count(), 1);
        assert!(text.contains("7b0c7c9e-0000-4000-8000-000000000001"));
        assert!(text.contains("Grace"));
    }
}
