use std::sync::Arc;

use beans_model::{RawImport, Severity};

use crate::builder::DocumentBuilder;
use crate::document::{DocumentNode, ImportRecord};

/// Expands the imports declared by `importing` into populated imported documents.
///
/// With `expand` unset the declarations are kept as records without documents. A resource that
/// is already on the current import chain is skipped with a warning.
pub(crate) fn expand_imports(
    importing: &DocumentNode,
    raw: Vec<RawImport>,
    builder: &mut DocumentBuilder,
    expand: bool,
) -> Vec<Arc<ImportRecord>> {
    let collaborators = importing.collaborators();
    let mut chain = importing.import_chain().to_vec();
    chain.push(importing.resource().to_string());

    raw.into_iter()
        .map(|import| {
            let line = (import.location.start_line > 0).then_some(import.location.start_line);
            let mut documents = Vec::new();
            if expand {
                match collaborators
                    .resources
                    .resolve(&import.resource, importing.resource())
                {
                    Ok(resources) => {
                        for resource in resources {
                            if chain.contains(&resource) {
                                tracing::warn!(
                                    target: "beans.imports",
                                    document = %importing.id(),
                                    resource = %resource,
                                    "skipping cyclic import"
                                );
                                builder.problem(
                                    Severity::Warning,
                                    format!("Import of '{resource}' is cyclic and was skipped"),
                                    line,
                                );
                                continue;
                            }
                            tracing::debug!(
                                target: "beans.imports",
                                document = %importing.id(),
                                resource = %resource,
                                "expanding import"
                            );
                            let node = DocumentNode::imported(
                                resource,
                                importing.id().clone(),
                                chain.clone(),
                                collaborators.clone(),
                            );
                            node.snapshot();
                            documents.push(node);
                        }
                    }
                    Err(err) => builder.problem(Severity::Error, err.to_string(), line),
                }
            }
            Arc::new(ImportRecord {
                importing: importing.id().clone(),
                resource: import.resource,
                location: import.location,
                documents,
            })
        })
        .collect()
}
