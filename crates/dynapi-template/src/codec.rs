//! Template Compiler and Transformation Codec.

use std::sync::Arc;

use dynapi_core::{DefaultRestMapper, RestMapper, TypeDescriptor, document};
use dynapi_eval::{CancellationToken, Evaluator, NodePath};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{CodecError, Result};
use crate::schema::literal_str;
use crate::template::{OUTPUT_KEY, PARAMETER_KEY, Template, strip_hidden_keys};

/// Compiles encode/decode template pairs into codecs.
#[derive(Clone)]
pub struct TemplateCompiler {
    evaluator: Evaluator,
    mapper: Arc<dyn RestMapper>,
}

impl TemplateCompiler {
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            mapper: Arc::new(DefaultRestMapper),
        }
    }

    /// Resolves resource names and scope through `mapper`.
    pub fn with_mapper(mut self, mapper: Arc<dyn RestMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Compiles the pair.
    ///
    /// Source is the type of the encode template's `parameter`, Target the type
    /// of its `output`. The decode template must declare the mirrored pair. An
    /// empty template converts by copying the document and re-stamping its type.
    #[instrument(level = "debug", skip_all)]
    pub fn compile(&self, encode: &str, decode: &str) -> Result<TransformationCodec> {
        let encode = self.compile_one(encode)?;
        let decode = self.compile_one(decode)?;

        let (source, target) = match (&encode, &decode) {
            (Some(enc), Some(dec)) => {
                let source = self.slot_type(enc, "encode", PARAMETER_KEY)?;
                let target = self.slot_type(enc, "encode", OUTPUT_KEY)?;
                expect_type(&self.slot_type(dec, "decode", PARAMETER_KEY)?, &target, "decode", PARAMETER_KEY)?;
                expect_type(&self.slot_type(dec, "decode", OUTPUT_KEY)?, &source, "decode", OUTPUT_KEY)?;
                (source, target)
            }
            (Some(enc), None) => (
                self.slot_type(enc, "encode", PARAMETER_KEY)?,
                self.slot_type(enc, "encode", OUTPUT_KEY)?,
            ),
            (None, Some(dec)) => (
                self.slot_type(dec, "decode", OUTPUT_KEY)?,
                self.slot_type(dec, "decode", PARAMETER_KEY)?,
            ),
            (None, None) => {
                return Err(CodecError::invalid_template(
                    "encode and decode templates are both empty",
                ));
            }
        };

        debug!(source = %source, target = %target, "Compiled transformation codec");
        Ok(TransformationCodec {
            source,
            target,
            encode,
            decode,
            evaluator: self.evaluator.clone(),
        })
    }

    fn compile_one(&self, text: &str) -> Result<Option<Template>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut template = Template::parse(text)?;
        if !template.doc().is_object() {
            return Err(CodecError::invalid_template("template must be a mapping"));
        }
        template.apply_signatures(&self.evaluator);
        Ok(Some(template))
    }

    fn slot_type(&self, template: &Template, which: &str, slot: &str) -> Result<TypeDescriptor> {
        let value = template
            .slot(slot)
            .ok_or_else(|| CodecError::invalid_template(format!("{which} template has no {slot}")))?;
        if !value.is_object() {
            return Err(CodecError::invalid_template(format!(
                "{which} template {slot} must be a mapping"
            )));
        }
        let literal = |field: &str| {
            value.get(field).and_then(literal_str).ok_or_else(|| {
                CodecError::invalid_template(format!(
                    "{which} template {slot}.{field} must be a string literal"
                ))
            })
        };
        let api_version = literal("apiVersion")?;
        let kind = literal("kind")?;
        if template
            .sites()
            .iter()
            .any(|site| site.path.head_field() == Some(slot) && is_type_field(&site.path))
        {
            return Err(CodecError::invalid_template(format!(
                "{which} template {slot} type must not be a reference"
            )));
        }
        TypeDescriptor::new(api_version, kind, self.mapper.as_ref())
            .map_err(|e| CodecError::invalid_template(format!("{which} template {slot}: {e}")))
    }
}

impl std::fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCompiler")
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

fn is_type_field(path: &NodePath) -> bool {
    matches!(
        path.segments(),
        [_, dynapi_eval::Segment::Field(f)] if f == "apiVersion" || f == "kind"
    )
}

fn expect_type(
    found: &TypeDescriptor,
    expected: &TypeDescriptor,
    template: &'static str,
    slot: &'static str,
) -> Result<()> {
    if found.same_type(expected) {
        Ok(())
    } else {
        Err(CodecError::TemplateTypeMismatch {
            template,
            slot,
            expected: expected.gvk().to_string(),
            found: found.gvk().to_string(),
        })
    }
}

/// Immutable pair of transforms between a source and a target type.
#[derive(Debug, Clone)]
pub struct TransformationCodec {
    source: TypeDescriptor,
    target: TypeDescriptor,
    encode: Option<Template>,
    decode: Option<Template>,
    evaluator: Evaluator,
}

impl TransformationCodec {
    /// Type exposed to API clients.
    pub fn source(&self) -> &TypeDescriptor {
        &self.source
    }

    /// Type stored in the backing system.
    pub fn target(&self) -> &TypeDescriptor {
        &self.target
    }

    /// Converts a source document into a target document.
    pub async fn encode(&self, doc: &Value, cancel: &CancellationToken) -> Result<Value> {
        self.convert(doc, self.encode.as_ref(), &self.target, cancel).await
    }

    /// Converts a target document back into a source document.
    pub async fn decode(&self, doc: &Value, cancel: &CancellationToken) -> Result<Value> {
        self.convert(doc, self.decode.as_ref(), &self.source, cancel).await
    }

    async fn convert(
        &self,
        doc: &Value,
        template: Option<&Template>,
        dest: &TypeDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if !doc.is_object() {
            return Err(CodecError::unmarshal("document must be an object"));
        }
        let mut out = match template {
            None => doc.clone(),
            Some(template) => {
                let rendered = template.render(&self.evaluator, Some(doc), cancel).await?;
                let output_path = NodePath::root().field(OUTPUT_KEY);
                if let Some(site) = rendered.unresolved_under(&output_path).next() {
                    return Err(CodecError::marshal(format!(
                        "{}: unresolved reference {}",
                        site.path,
                        site.source()
                    )));
                }
                let mut output = rendered
                    .lookup(&output_path)
                    .cloned()
                    .ok_or_else(|| CodecError::marshal("template produced no output"))?;
                if !output.is_object() {
                    return Err(CodecError::marshal("template output must be an object"));
                }
                strip_hidden_keys(&mut output);
                output
            }
        };
        document::stamp(&mut out, &dest.gvk()).map_err(|e| CodecError::marshal(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use dynapi_core::GroupVersion;
    use dynapi_eval::{ProviderError, ProviderPackage, ProviderRegistry, providers, typed};
    use serde_json::json;

    const ENCODER: &str = r#"
parameter:
  apiVersion: test.oam.dev/v1alpha2
  kind: Tester
  metadata: <object>
output:
  apiVersion: v1
  kind: ConfigMap
  metadata: ${parameter.metadata}
  data: {}
"#;

    const DECODER: &str = r#"
parameter:
  apiVersion: v1
  kind: ConfigMap
  metadata: <object>
  data: <object>
output:
  apiVersion: test.oam.dev/v1alpha2
  kind: Tester
  metadata: ${parameter.metadata}
"#;

    fn compiler() -> TemplateCompiler {
        TemplateCompiler::new(Evaluator::new(Arc::new(ProviderRegistry::new())))
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_template_codec() {
        let codec = compiler().compile(ENCODER, DECODER).unwrap();
        let source_gvk = GroupVersion::new("test.oam.dev", "v1alpha2").with_kind("Tester");
        let target_gvk = GroupVersion::new("", "v1").with_kind("ConfigMap");
        assert_eq!(codec.source().gvk(), source_gvk);
        assert_eq!(codec.target().gvk(), target_gvk);
        assert_eq!(codec.source().resource(), "testers");

        let src = json!({"apiVersion": "test.oam.dev/v1alpha2", "kind": "Tester"});
        let tgt = codec.encode(&src, &cancel()).await.unwrap();
        assert_eq!(document::gvk(&tgt), Some(target_gvk.clone()));

        let tgt = json!({"apiVersion": "v1", "kind": "ConfigMap"});
        let src = codec.decode(&tgt, &cancel()).await.unwrap();
        assert_eq!(document::gvk(&src), Some(source_gvk));

        let bad = json!({"apiVersion": "bad/unknown", "kind": "v0"});
        assert!(matches!(
            codec.encode(&bad, &cancel()).await,
            Err(CodecError::Unmarshal(_))
        ));
    }

    #[test]
    fn test_bad_templates() {
        let compiler = compiler();
        assert!(matches!(
            compiler.compile("bad-key: bad-val", ""),
            Err(CodecError::InvalidTemplate(_))
        ));
        assert!(matches!(
            compiler.compile("parameter:\n  apiVersion: 1\n", ""),
            Err(CodecError::InvalidTemplate(_))
        ));
        assert!(matches!(
            compiler.compile("parameter:\n  apiVersion: v1\n", ""),
            Err(CodecError::InvalidTemplate(_))
        ));
        assert!(matches!(
            compiler.compile(ENCODER, "bad-good"),
            Err(CodecError::InvalidTemplate(_))
        ));
        assert!(matches!(
            compiler.compile("parameter: [", ""),
            Err(CodecError::Compile(_))
        ));
        assert!(matches!(compiler.compile("", " "), Err(CodecError::InvalidTemplate(_))));

        let placeholder_kind = "parameter:\n  apiVersion: v1\n  kind: <string>\noutput:\n  apiVersion: v1\n  kind: Foo\n";
        assert!(matches!(
            compiler.compile(placeholder_kind, ""),
            Err(CodecError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_mismatched_decode_template() {
        let decoder = DECODER.replace("kind: Tester", "kind: Other");
        let err = compiler().compile(ENCODER, &decoder).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TemplateTypeMismatch { template: "decode", slot: OUTPUT_KEY, .. }
        ));
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let encoder = r#"
parameter:
  apiVersion: x/v1
  kind: Foo
  metadata: <object>
output:
  apiVersion: v1
  kind: ConfigMap
  metadata: ${parameter.metadata}
"#;
        let decoder = r#"
parameter:
  apiVersion: v1
  kind: ConfigMap
  metadata: <object>
output:
  apiVersion: x/v1
  kind: Foo
  metadata: ${parameter.metadata}
"#;
        let codec = compiler().compile(encoder, decoder).unwrap();
        let metadata = json!({"name": "example", "namespace": "default", "labels": {"a": "b"}});
        let foo = json!({"apiVersion": "x/v1", "kind": "Foo", "metadata": metadata});

        let config_map = codec.encode(&foo, &cancel()).await.unwrap();
        assert_eq!(config_map["kind"], "ConfigMap");
        assert_eq!(config_map["apiVersion"], "v1");
        assert_eq!(config_map["metadata"], metadata);

        let back = codec.decode(&config_map, &cancel()).await.unwrap();
        assert_eq!(back, foo);
    }

    #[tokio::test]
    async fn test_empty_template_is_passthrough() {
        let codec = compiler().compile("", DECODER).unwrap();
        assert_eq!(codec.source().kind(), "Tester");
        assert_eq!(codec.target().kind(), "ConfigMap");

        let src = json!({"apiVersion": "test.oam.dev/v1alpha2", "kind": "Tester", "spec": {"a": 1}});
        let tgt = codec.encode(&src, &cancel()).await.unwrap();
        assert_eq!(
            tgt,
            json!({"apiVersion": "v1", "kind": "ConfigMap", "spec": {"a": 1}})
        );
    }

    #[tokio::test]
    async fn test_unresolved_output_reference_is_marshal_error() {
        let encoder = "parameter:\n  apiVersion: x/v1\n  kind: Foo\noutput:\n  apiVersion: v1\n  kind: ConfigMap\n  data: ${parameter.spec.missing}\n";
        let codec = compiler().compile(encoder, "").unwrap();
        let err = codec
            .encode(&json!({"apiVersion": "x/v1", "kind": "Foo"}), &cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Marshal(ref m) if m.contains("${parameter.spec.missing}")));
    }

    #[tokio::test]
    async fn test_templates_invoke_providers() {
        let registry = ProviderRegistry::new();
        let lookup = typed(|_ctx, params: Value| async move {
            let name = params["name"].as_str().unwrap_or_default().to_string();
            if name.is_empty() {
                return Err(ProviderError::failed("name required"));
            }
            Ok(json!({"id": format!("id-{name}")}))
        });
        registry.register(
            ProviderPackage::new("ids", "lookup:\n  scope: global\n", HashMap::from([("lookup".to_string(), lookup)]))
                .unwrap(),
        );
        let compiler = TemplateCompiler::new(Evaluator::new(Arc::new(registry)));
        let encoder = r##"
parameter:
  apiVersion: x/v1
  kind: Foo
  metadata:
    name: <string>
resolve:
  "#do": lookup
  "#provider": ids
  name: ${parameter.metadata.name}
output:
  apiVersion: v1
  kind: ConfigMap
  metadata:
    name: ${parameter.metadata.name}
  data:
    id: ${resolve.id}
    scope: ${resolve.scope}
"##;
        let codec = compiler.compile(encoder, "").unwrap();
        let out = codec
            .encode(
                &json!({"apiVersion": "x/v1", "kind": "Foo", "metadata": {"name": "web"}}),
                &cancel(),
            )
            .await
            .unwrap();
        assert_eq!(out["data"], json!({"id": "id-web", "scope": "global"}));

        let err = codec
            .encode(
                &json!({"apiVersion": "x/v1", "kind": "Foo", "metadata": {"name": ""}}),
                &cancel(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Evaluation(dynapi_eval::EvalError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_http_provider_in_template() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dashboards/web"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"title\":\"Web\"}"))
            .mount(&server)
            .await;

        let registry = ProviderRegistry::new();
        providers::register_builtin(&registry, std::time::Duration::from_secs(5)).unwrap();
        let compiler = TemplateCompiler::new(Evaluator::new(Arc::new(registry)));
        let decoder = format!(
            r##"
parameter:
  apiVersion: v1
  kind: ConfigMap
  metadata:
    name: <string>
fetch:
  "#do": do
  "#provider": http
  url: "{}/dashboards/${{parameter.metadata.name}}"
output:
  apiVersion: x/v1
  kind: Dashboard
  metadata:
    name: ${{parameter.metadata.name}}
  spec:
    raw: ${{fetch.response.body}}
    status: ${{fetch.response.statusCode}}
"##,
            server.uri()
        );
        let codec = compiler.compile("", &decoder).unwrap();
        let out = codec
            .decode(
                &json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "web"}}),
                &cancel(),
            )
            .await
            .unwrap();
        assert_eq!(out["kind"], "Dashboard");
        assert_eq!(out["spec"]["raw"], "{\"title\":\"Web\"}");
        assert_eq!(out["spec"]["status"], 200);
    }
}
