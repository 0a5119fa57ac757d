//! Instance listing for post-workflow summaries and the `list` subcommand.

use crate::client::{ClientError, CloudClient};
use crate::resource::ResourceKind;

/// Heading printed before the instance names.
pub const RUNNING_INSTANCES_HEADING: &str = "Your running instances are:";

/// Names of every instance in the client's scope, sorted.
///
/// # Errors
///
/// Returns [`ClientError`] when the listing fails.
pub async fn instance_names<C: CloudClient>(client: &C) -> Result<Vec<String>, ClientError> {
    let mut names: Vec<String> = client
        .list(ResourceKind::Instance)
        .await?
        .into_iter()
        .map(|resource| resource.name)
        .collect();
    names.sort();
    Ok(names)
}

/// Renders the heading followed by one name per line.
#[must_use]
pub fn render_names(names: &[String]) -> String {
    let mut rendered = format!("{RUNNING_INSTANCES_HEADING}\n");
    for name in names {
        rendered.push_str(name);
        rendered.push('\n');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CloudCall, FakeCloud};

    #[tokio::test]
    async fn lists_only_instances_sorted() {
        let cloud = FakeCloud::new();
        cloud.insert_existing(ResourceKind::Instance, "flask-vm");
        cloud.insert_existing(ResourceKind::Instance, "flask-clone-1");
        cloud.insert_existing(ResourceKind::Snapshot, "base-snapshot-flask-vm");

        let names = instance_names(&cloud).await.expect("list");

        assert_eq!(names, vec!["flask-clone-1", "flask-vm"]);
        assert_eq!(cloud.calls(), vec![CloudCall::List(ResourceKind::Instance)]);
    }

    #[test]
    fn renders_heading_then_names() {
        let rendered = render_names(&[String::from("a"), String::from("b")]);
        assert_eq!(rendered, "Your running instances are:\na\nb\n");
    }

    #[test]
    fn renders_heading_alone_when_empty() {
        assert_eq!(render_names(&[]), "Your running instances are:\n");
    }
}
