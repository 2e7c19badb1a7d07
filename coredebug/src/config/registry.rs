use std::sync::Arc;

use coredebug_target::{CoreFamily, VariantDescription, VariantDescriptionSource};

/// An error while looking up or loading a variant description.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum RegistryError {
    /// No variant description for the core family {0:?} was found.
    FamilyNotFound(CoreFamily),
    /// No variant description named `{0}` was found.
    VariantNotFound(String),
    /// The variant description is invalid: {0}
    InvalidDescription(String),
    /// Failed to parse the variant description.
    Yaml(#[from] serde_yaml::Error),
    /// Failed to read the variant description.
    Io(#[from] std::io::Error),
}

#[cfg(feature = "builtin-targets")]
const BUILTIN_VARIANTS: &[(&str, &str)] = &[
    ("arc_em.yaml", include_str!("../../targets/arc_em.yaml")),
    ("arc_hs.yaml", include_str!("../../targets/arc_hs.yaml")),
    ("rv32_lite.yaml", include_str!("../../targets/rv32_lite.yaml")),
    ("rv32.yaml", include_str!("../../targets/rv32.yaml")),
];

struct Entry {
    variant: Arc<VariantDescription>,
    source: VariantDescriptionSource,
}

/// All core variants the debug engine can drive.
///
/// Lookups happen once, when a core is attached. The resulting description is shared with the
/// [`CoreState`](crate::CoreState) of the core.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all builtin variant descriptions.
    #[cfg(feature = "builtin-targets")]
    pub fn from_builtin_variants() -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for (file, yaml) in BUILTIN_VARIANTS {
            tracing::trace!("Loading builtin variant description {}", file);

            let variant = parse_variant(yaml.as_bytes())?;
            registry.insert(variant, VariantDescriptionSource::BuiltIn);
        }

        Ok(registry)
    }

    /// All known variants.
    pub fn variants(&self) -> impl Iterator<Item = &VariantDescription> {
        self.entries.iter().map(|entry| entry.variant.as_ref())
    }

    /// The variant description for a core family.
    ///
    /// Descriptions added at runtime take precedence over builtin ones.
    pub fn variant(&self, family: CoreFamily) -> Result<Arc<VariantDescription>, RegistryError> {
        self.entries
            .iter()
            .filter(|entry| entry.variant.family == family)
            .max_by_key(|entry| entry.source == VariantDescriptionSource::External)
            .map(|entry| entry.variant.clone())
            .ok_or(RegistryError::FamilyNotFound(family))
    }

    /// The variant description with the given name, ignoring case.
    pub fn variant_by_name(&self, name: &str) -> Result<Arc<VariantDescription>, RegistryError> {
        self.entries
            .iter()
            .find(|entry| entry.variant.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.variant.clone())
            .ok_or_else(|| RegistryError::VariantNotFound(name.to_string()))
    }

    /// Where the description with the given name came from.
    pub fn source_of(&self, name: &str) -> Option<&VariantDescriptionSource> {
        self.entries
            .iter()
            .find(|entry| entry.variant.name.eq_ignore_ascii_case(name))
            .map(|entry| &entry.source)
    }

    /// Add a variant description from YAML, replacing a description with the same name.
    pub fn add_variant_from_yaml<R: std::io::Read>(
        &mut self,
        yaml_reader: R,
    ) -> Result<Arc<VariantDescription>, RegistryError> {
        let variant = parse_variant(yaml_reader)?;
        Ok(self.insert(variant, VariantDescriptionSource::External))
    }

    fn insert(
        &mut self,
        variant: VariantDescription,
        source: VariantDescriptionSource,
    ) -> Arc<VariantDescription> {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.variant.name == variant.name)
        {
            tracing::debug!("Replacing variant description {}", variant.name);
            self.entries.remove(index);
        }

        let variant = Arc::new(variant);
        self.entries.push(Entry {
            variant: variant.clone(),
            source,
        });
        variant
    }
}

fn parse_variant<R: std::io::Read>(reader: R) -> Result<VariantDescription, RegistryError> {
    let variant: VariantDescription = serde_yaml::from_reader(reader)?;
    variant
        .validate()
        .map_err(RegistryError::InvalidDescription)?;
    Ok(variant)
}

#[cfg(test)]
mod test {
    use super::*;
    use coredebug_target::{RegisterKind, RegisterRef};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(CoreFamily::ArcEm, 2; "arc em")]
    #[test_case(CoreFamily::ArcHs, 4; "arc hs")]
    #[test_case(CoreFamily::Rv32Lite, 2; "rv32 lite")]
    #[test_case(CoreFamily::Rv32, 4; "rv32")]
    fn builtin_comparator_counts(family: CoreFamily, slots: usize) {
        let registry = Registry::from_builtin_variants().unwrap();

        let variant = registry.variant(family).unwrap();

        assert_eq!(variant.comparators.slots.len(), slots);
    }

    #[test]
    fn arc_reserved_registers_are_not_listed() {
        let registry = Registry::from_builtin_variants().unwrap();
        let variant = registry.variant(CoreFamily::ArcEm).unwrap();

        let registers = variant.registers();

        assert!(!registers
            .iter()
            .any(|register| register.register == RegisterRef::core(61)));
        assert!(!registers
            .iter()
            .any(|register| register.register == RegisterRef::core(62)));

        let pcl = registers
            .iter()
            .find(|register| register.register == RegisterRef::core(63))
            .unwrap();
        assert_eq!(pcl.name, "pcl");
        assert!(pcl.read_only);
    }

    #[test]
    fn rv32_lite_has_sixteen_registers() {
        let registry = Registry::from_builtin_variants().unwrap();
        let variant = registry.variant(CoreFamily::Rv32Lite).unwrap();

        let existing = variant
            .registers()
            .iter()
            .filter(|register| register.register.kind == RegisterKind::Core && register.exists)
            .count();

        assert_eq!(existing, 16);
    }

    #[test]
    fn lookup_by_name_ignores_case() {
        let registry = Registry::from_builtin_variants().unwrap();

        let variant = registry.variant_by_name("ARC_HS").unwrap();

        assert_eq!(variant.family, CoreFamily::ArcHs);
        assert!(matches!(
            registry.variant_by_name("x86"),
            Err(RegistryError::VariantNotFound(_))
        ));
    }

    #[test]
    fn external_descriptions_win() {
        let mut registry = Registry::from_builtin_variants().unwrap();
        let yaml = include_str!("../../targets/rv32.yaml").replace("name: rv32", "name: my_rv32");

        registry.add_variant_from_yaml(yaml.as_bytes()).unwrap();

        assert_eq!(registry.variant(CoreFamily::Rv32).unwrap().name, "my_rv32");
        assert_eq!(
            registry.source_of("my_rv32"),
            Some(&VariantDescriptionSource::External)
        );
    }

    #[test]
    fn invalid_description_is_rejected() {
        let mut registry = Registry::new();
        let yaml = include_str!("../../targets/rv32.yaml")
            .replace("narrow: [0x02, 0x90]", "narrow: [0x02]");

        let result = registry.add_variant_from_yaml(yaml.as_bytes());

        assert!(matches!(result, Err(RegistryError::InvalidDescription(_))));
    }
}
