//! End-to-end tests of the terminology service.
//!
//! Each test writes a small RF2 release into a temporary directory, imports
//! it through [`TerminologyService`] and queries the committed index.

use std::path::Path;
use std::time::Duration;

use snomed_index::{well_known, DirectoryRelease, ReleaseArchive};
use snomed_query::{
    CacheConfig, ComposeSpec, ExpandRequest, QueryError, SctId, TerminologyConfig,
    TerminologyService,
};
use tempfile::{tempdir, TempDir};

const MODULE: u64 = 900000000000207008;
const VERSION: &str = "http://snomed.info/sct/900000000000207008/version/20240101";

const ROOT: u64 = 138875005;
const CLINICAL_FINDING: u64 = 404684003;
const DISEASE: u64 = 64572001;
const MYOCARDIAL_INFARCTION: u64 = 22298006;
const OLD_MI: u64 = 1755008;
const BODY_STRUCTURE: u64 = 123037004;
const MYOCARDIUM: u64 = 74281007;
const MIDDLE_EAR: u64 = 25342003;
const INFARCT: u64 = 55641003;
const FINDING_SITE: u64 = 363698007;
const MORPHOLOGY: u64 = 116676008;
const CARDIAC_REFSET: u64 = 723264001;
const CTV3_MAP: u64 = 900000000000497000;
const ICD10_MAP: u64 = 447562003;
const PROPERLY_CLASSIFIED: u64 = 447637006;
const SWEDISH: u64 = 46011000052107;

// =============================================================================
// Release fixture
// =============================================================================

const REFSET_HEADER: &str = "id\teffectiveTime\tactive\tmoduleId\trefsetId\treferencedComponentId";

#[derive(Default)]
struct Release {
    concepts: Vec<String>,
    descriptions: Vec<String>,
    relationships: Vec<String>,
    language: Vec<String>,
    simple: Vec<String>,
    simple_map: Vec<String>,
    extended_map: Vec<String>,
    next_id: u64,
}

impl Release {
    fn new() -> Self {
        Self {
            next_id: 1_000_000,
            ..Self::default()
        }
    }

    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn concept(&mut self, id: u64, active: bool, defined: bool) -> &mut Self {
        let status = if defined {
            well_known::FULLY_DEFINED
        } else {
            well_known::PRIMITIVE
        };
        self.concepts.push(format!(
            "{id}\t20240101\t{}\t{MODULE}\t{status}",
            u8::from(active)
        ));
        self
    }

    /// FSN and a GB/US preferred synonym.
    fn terms(&mut self, concept: u64, fsn: &str, preferred: &str) -> &mut Self {
        let fsn_id = self.description(concept, "en", well_known::FULLY_SPECIFIED_NAME, fsn);
        let pt_id = self.description(concept, "en", well_known::SYNONYM, preferred);
        for dialect in [well_known::GB_ENGLISH, well_known::US_ENGLISH] {
            self.acceptability(dialect, fsn_id);
            self.acceptability(dialect, pt_id);
        }
        self
    }

    fn description(&mut self, concept: u64, language: &str, type_id: u64, term: &str) -> u64 {
        let id = self.id();
        self.descriptions.push(format!(
            "{id}\t20240101\t1\t{MODULE}\t{concept}\t{language}\t{type_id}\t{term}\t900000000000448009"
        ));
        id
    }

    fn acceptability(&mut self, refset: u64, description: u64) -> &mut Self {
        let id = self.id();
        self.language.push(format!(
            "l{id}\t20240101\t1\t{MODULE}\t{refset}\t{description}\t{}",
            well_known::PREFERRED
        ));
        self
    }

    fn is_a(&mut self, child: u64, parent: u64) -> &mut Self {
        self.relationship(0, child, well_known::IS_A, parent)
    }

    fn relationship(&mut self, group: u32, source: u64, type_id: u64, target: u64) -> &mut Self {
        let id = self.id();
        self.relationships.push(format!(
            "{id}\t20240101\t1\t{MODULE}\t{source}\t{target}\t{group}\t{type_id}\t{}\t900000000000451002",
            well_known::INFERRED_RELATIONSHIP
        ));
        self
    }

    fn member(&mut self, refset: u64, concept: u64) -> &mut Self {
        let id = self.id();
        self.simple
            .push(format!("s{id}\t20240101\t1\t{MODULE}\t{refset}\t{concept}"));
        self
    }

    fn simple_map(&mut self, refset: u64, concept: u64, target: &str) -> &mut Self {
        let id = self.id();
        self.simple_map.push(format!(
            "m{id}\t20240101\t1\t{MODULE}\t{refset}\t{concept}\t{target}"
        ));
        self
    }

    fn extended_map(&mut self, refset: u64, concept: u64, target: &str, category: u64) -> &mut Self {
        let id = self.id();
        self.extended_map.push(format!(
            "x{id}\t20240101\t1\t{MODULE}\t{refset}\t{concept}\t1\t1\tTRUE\tALWAYS {target}\t{target}\t447561005\t{category}"
        ));
        self
    }

    fn write_to(&self, root: &Path) {
        let table = |header: &str, rows: &[String]| {
            let mut text = String::from(header);
            text.push_str("\r\n");
            for row in rows {
                text.push_str(row);
                text.push_str("\r\n");
            }
            text
        };
        let base = root.join("SnomedCT_TestRF2_PRODUCTION_20240101T120000Z/Snapshot");
        let files = [
            (
                "Terminology/sct2_Concept_Snapshot_INT_20240101.txt",
                table("id\teffectiveTime\tactive\tmoduleId\tdefinitionStatusId", &self.concepts),
            ),
            (
                "Terminology/sct2_Description_Snapshot-en_INT_20240101.txt",
                table(
                    "id\teffectiveTime\tactive\tmoduleId\tconceptId\tlanguageCode\ttypeId\tterm\tcaseSignificanceId",
                    &self.descriptions,
                ),
            ),
            (
                "Terminology/sct2_Relationship_Snapshot_INT_20240101.txt",
                table(
                    "id\teffectiveTime\tactive\tmoduleId\tsourceId\tdestinationId\trelationshipGroup\ttypeId\tcharacteristicTypeId\tmodifierId",
                    &self.relationships,
                ),
            ),
            (
                "Refset/Language/der2_cRefset_LanguageSnapshot-en_INT_20240101.txt",
                table(&format!("{REFSET_HEADER}\tacceptabilityId"), &self.language),
            ),
            (
                "Refset/Content/der2_Refset_SimpleSnapshot_INT_20240101.txt",
                table(REFSET_HEADER, &self.simple),
            ),
            (
                "Refset/Map/der2_sRefset_SimpleMapSnapshot_INT_20240101.txt",
                table(&format!("{REFSET_HEADER}\tmapTarget"), &self.simple_map),
            ),
            (
                "Refset/Map/der2_iisssccRefset_ExtendedMapSnapshot_INT_20240101.txt",
                table(
                    &format!("{REFSET_HEADER}\tmapGroup\tmapPriority\tmapRule\tmapAdvice\tmapTarget\tcorrelationId\tmapCategoryId"),
                    &self.extended_map,
                ),
            ),
        ];
        for (name, text) in files {
            let path = base.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }
    }
}

fn clinical_release() -> Release {
    let mut r = Release::new();
    for id in [
        ROOT,
        CLINICAL_FINDING,
        BODY_STRUCTURE,
        MYOCARDIUM,
        MIDDLE_EAR,
        INFARCT,
        well_known::CONCEPT_MODEL_ATTRIBUTE,
        FINDING_SITE,
        MORPHOLOGY,
        CARDIAC_REFSET,
        well_known::SIMPLE_MAP_ROOT,
        well_known::EXTENDED_MAP_ROOT,
        well_known::MAP_CATEGORY_VALUE,
        CTV3_MAP,
        ICD10_MAP,
        PROPERLY_CLASSIFIED,
    ] {
        r.concept(id, true, false);
    }
    r.concept(DISEASE, true, true)
        .concept(MYOCARDIAL_INFARCTION, true, true)
        .concept(OLD_MI, false, false);

    r.terms(ROOT, "SNOMED CT Concept (SNOMED RT+CTV3)", "SNOMED CT Concept")
        .terms(CLINICAL_FINDING, "Clinical finding (finding)", "Clinical finding")
        .terms(DISEASE, "Disease (disorder)", "Disease")
        .terms(MYOCARDIAL_INFARCTION, "Myocardial infarction (disorder)", "Myocardial infarction")
        .terms(OLD_MI, "Heart attack (disorder)", "Heart attack")
        .terms(BODY_STRUCTURE, "Body structure (body structure)", "Body structure")
        .terms(MYOCARDIUM, "Myocardium structure (body structure)", "Myocardium structure")
        .terms(MIDDLE_EAR, "Middle ear structure (body structure)", "Middle ear structure")
        .terms(INFARCT, "Infarct (morphologic abnormality)", "Infarct")
        .terms(FINDING_SITE, "Finding site (attribute)", "Finding site")
        .terms(MORPHOLOGY, "Associated morphology (attribute)", "Associated morphology")
        .terms(PROPERLY_CLASSIFIED, "Properly classified (foundation metadata concept)", "Properly classified");
    let swedish = r.description(MIDDLE_EAR, "sv", well_known::SYNONYM, "Mellanöra");
    r.acceptability(SWEDISH, swedish);

    r.is_a(CLINICAL_FINDING, ROOT)
        .is_a(DISEASE, CLINICAL_FINDING)
        .is_a(MYOCARDIAL_INFARCTION, DISEASE)
        .is_a(BODY_STRUCTURE, ROOT)
        .is_a(MYOCARDIUM, BODY_STRUCTURE)
        .is_a(MIDDLE_EAR, BODY_STRUCTURE)
        .is_a(INFARCT, ROOT)
        .is_a(well_known::CONCEPT_MODEL_ATTRIBUTE, ROOT)
        .is_a(FINDING_SITE, well_known::CONCEPT_MODEL_ATTRIBUTE)
        .is_a(MORPHOLOGY, well_known::CONCEPT_MODEL_ATTRIBUTE)
        .is_a(CTV3_MAP, well_known::SIMPLE_MAP_ROOT)
        .is_a(ICD10_MAP, well_known::EXTENDED_MAP_ROOT)
        .is_a(PROPERLY_CLASSIFIED, well_known::MAP_CATEGORY_VALUE)
        .relationship(1, MYOCARDIAL_INFARCTION, FINDING_SITE, MYOCARDIUM)
        .relationship(1, MYOCARDIAL_INFARCTION, MORPHOLOGY, INFARCT);

    r.member(CARDIAC_REFSET, MYOCARDIAL_INFARCTION)
        .simple_map(CTV3_MAP, MYOCARDIAL_INFARCTION, "X200E")
        .extended_map(ICD10_MAP, MYOCARDIAL_INFARCTION, "I21.9", PROPERLY_CLASSIFIED);
    r
}

/// A running service plus the directories backing it.
struct Fixture {
    service: TerminologyService,
    _release: TempDir,
    _index: TempDir,
}

fn config() -> TerminologyConfig {
    TerminologyConfig::builder()
        .with_dialect("sv", [SWEDISH])
        .with_page_sizes(100, 50)
        .build()
}

fn load(release: &Release, config: TerminologyConfig) -> Fixture {
    let release_dir = tempdir().unwrap();
    release.write_to(release_dir.path());
    let index_dir = tempdir().unwrap();
    let service = TerminologyService::open(index_dir.path(), config).unwrap();
    service
        .import(vec![Box::new(DirectoryRelease::new(release_dir.path()))], VERSION)
        .unwrap();
    Fixture {
        service,
        _release: release_dir,
        _index: index_dir,
    }
}

fn loaded() -> Fixture {
    load(&clinical_release(), config())
}

fn ids(service: &TerminologyService, ecl: &str) -> Vec<SctId> {
    service.evaluate(ecl).unwrap().iter().collect()
}

fn expand(service: &TerminologyService, request: ExpandRequest) -> Vec<SctId> {
    service.expand(&request).unwrap().ids()
}

// =============================================================================
// Tests
// =============================================================================

mod not_loaded {
    use super::*;

    #[test]
    fn test_queries_before_import() {
        let dir = tempdir().unwrap();
        let service = TerminologyService::open(dir.path(), config()).unwrap();

        assert!(!service.is_loaded());
        assert_eq!(service.code_system_metadata().unwrap(), None);
        assert!(matches!(service.concept(ROOT), Err(QueryError::NotLoaded)));
        assert!(matches!(service.terms(&[ROOT], &[]), Err(QueryError::NotLoaded)));
        assert!(matches!(service.compile_expression("<< 138875005"), Err(QueryError::NotLoaded)));
        let request = ExpandRequest::new(ComposeSpec::new().include_ecl("*"));
        assert!(matches!(service.expand(&request), Err(QueryError::NotLoaded)));
    }

    #[test]
    fn test_invalid_version_leaves_service_unloaded() {
        let release_dir = tempdir().unwrap();
        clinical_release().write_to(release_dir.path());
        let index_dir = tempdir().unwrap();
        let service = TerminologyService::open(index_dir.path(), config()).unwrap();

        let archives: Vec<Box<dyn ReleaseArchive>> =
            vec![Box::new(DirectoryRelease::new(release_dir.path()))];
        let error = service.import(archives, "http://snomed.info/sct/900000000000207008").unwrap_err();
        assert!(error.is_invalid_input());
        assert!(!service.is_loaded());
    }
}

mod lookups {
    use super::*;

    #[test]
    fn test_code_system_metadata() {
        let fixture = loaded();
        let metadata = fixture.service.code_system_metadata().unwrap().unwrap();
        assert_eq!(metadata.module_id, MODULE);
        assert_eq!(metadata.version_date, "20240101");
        assert_eq!(metadata.version_uri(), VERSION);
    }

    #[test]
    fn test_concept() {
        let fixture = loaded();
        let concept = fixture.service.concept(MYOCARDIAL_INFARCTION).unwrap().unwrap();
        assert!(concept.active);
        assert_eq!(concept.parents.iter().copied().collect::<Vec<_>>(), vec![DISEASE]);
        assert_eq!(
            concept.ancestors.iter().copied().collect::<Vec<_>>(),
            vec![DISEASE, ROOT, CLINICAL_FINDING]
        );
        assert!(concept.memberships.contains(&CARDIAC_REFSET));
        assert_eq!(concept.relationships.len(), 2);
    }

    #[test]
    fn test_unknown_keys_are_absent() {
        let fixture = loaded();
        assert!(fixture.service.concept(999999999).unwrap().is_none());
        // The code system document is not a concept.
        assert!(fixture.service.concept(u64::MAX).unwrap().is_none());
    }

    #[test]
    fn test_simple_and_complex_maps() {
        let fixture = loaded();
        let concept = fixture.service.concept(MYOCARDIAL_INFARCTION).unwrap().unwrap();

        let simple = concept.mappings.iter().find(|m| m.refset_id == CTV3_MAP).unwrap();
        assert_eq!(simple.target, "X200E");
        assert!(simple.advice.is_none());

        let complex = concept.mappings.iter().find(|m| m.refset_id == ICD10_MAP).unwrap();
        assert_eq!(complex.target, "I21.9");
        let advice = complex.advice.as_deref().unwrap();
        assert!(advice.contains("ALWAYS I21.9"));
        assert!(advice.contains("Properly classified"));
    }

    #[test]
    fn test_terms_follow_dialects() {
        let fixture = loaded();
        let service = &fixture.service;

        let english = service
            .terms(&[MYOCARDIAL_INFARCTION, MIDDLE_EAR, 999999999], &["en-GB".to_string()])
            .unwrap();
        assert_eq!(english.len(), 2);
        assert_eq!(english[&MYOCARDIAL_INFARCTION], "Myocardial infarction");
        assert_eq!(english[&MIDDLE_EAR], "Middle ear structure");

        let swedish = service
            .terms(&[MYOCARDIAL_INFARCTION, MIDDLE_EAR], &["sv".to_string()])
            .unwrap();
        assert_eq!(swedish[&MIDDLE_EAR], "Mellanöra");
        // No Swedish synonym: the FSN stands in.
        assert_eq!(swedish[&MYOCARDIAL_INFARCTION], "Myocardial infarction (disorder)");
    }
}

mod ecl {
    use super::*;

    #[test]
    fn test_two_concept_hierarchy() {
        let mut release = Release::new();
        release.concept(7, true, false).concept(9, true, false).is_a(9, 7);
        let fixture = load(&release, config());
        let service = &fixture.service;

        assert!(ids(service, "< 9").is_empty());
        assert_eq!(ids(service, "<< 9"), vec![9]);
        assert_eq!(ids(service, "> 9"), vec![7]);
        assert_eq!(ids(service, "< 7"), vec![9]);
    }

    #[test]
    fn test_hierarchy_over_release() {
        let fixture = loaded();
        let service = &fixture.service;

        assert_eq!(ids(service, "< 404684003"), vec![MYOCARDIAL_INFARCTION, DISEASE]);
        assert_eq!(
            ids(service, "> 22298006"),
            vec![DISEASE, ROOT, CLINICAL_FINDING]
        );
        assert_eq!(ids(service, ">! 22298006"), vec![DISEASE]);
        assert!(ids(service, "> 999999999").is_empty());
        assert_eq!(ids(service, "^ 723264001"), vec![MYOCARDIAL_INFARCTION]);
    }

    #[test]
    fn test_refinements() {
        let fixture = loaded();
        let service = &fixture.service;

        assert_eq!(
            ids(service, "< 404684003 : 363698007 = << 123037004"),
            vec![MYOCARDIAL_INFARCTION]
        );
        assert_eq!(
            ids(service, "< 404684003 : * = 55641003"),
            vec![MYOCARDIAL_INFARCTION]
        );
        assert_eq!(ids(service, "< 404684003 : 363698007 != *"), vec![DISEASE]);
    }

    #[test]
    fn test_unsupported_constructs_are_named() {
        let fixture = loaded();
        match fixture.service.compile_expression("< 404684003 {{ C active = 1 }}") {
            Err(QueryError::UnsupportedFeature { feature }) => assert_eq!(feature, "concept filter"),
            other => panic!("expected unsupported feature, got {other:?}"),
        }
        assert!(matches!(
            fixture.service.compile_expression("< 404684003 : R 363698007 = 74281007"),
            Err(QueryError::UnsupportedFeature { .. })
        ));
        assert!(matches!(
            fixture.service.compile_expression("< 404684003 :"),
            Err(QueryError::Parse(_))
        ));
    }

    #[test]
    fn test_compiled_query_is_reusable() {
        let fixture = loaded();
        let compiled = fixture.service.compile_expression("<< 64572001").unwrap();
        assert_eq!(compiled.to_string(), "<< 64572001");
        assert!(compiled.generation > 0);
    }
}

mod expansion {
    use super::*;

    fn everything() -> ExpandRequest {
        ExpandRequest::new(ComposeSpec::new().include_ecl("*"))
    }

    #[test]
    fn test_prefix_filter_and_ranking() {
        let fixture = loaded();
        // "Finding site" is shorter than "Clinical finding" and ranks first.
        assert_eq!(
            expand(&fixture.service, everything().with_filter("find")),
            vec![FINDING_SITE, CLINICAL_FINDING]
        );
        assert_eq!(
            expand(&fixture.service, everything().with_filter("finding sit")),
            vec![FINDING_SITE]
        );
    }

    #[test]
    fn test_folding_uses_display_language() {
        let fixture = loaded();
        let swedish = || everything().with_dialects(["sv"]);

        assert!(expand(&fixture.service, swedish().with_filter("mellanora")).is_empty());

        let page = fixture
            .service
            .expand(&swedish().with_filter("mellanöra"))
            .unwrap();
        assert_eq!(page.ids(), vec![MIDDLE_EAR]);
        assert_eq!(page.concepts[0].display.as_deref(), Some("Mellanöra"));
    }

    #[test]
    fn test_fuzzy_and_numeric_filters() {
        let fixture = loaded();
        assert_eq!(
            expand(&fixture.service, everything().with_filter("myocardail~")),
            vec![MYOCARDIAL_INFARCTION]
        );
        assert_eq!(
            expand(&fixture.service, everything().with_filter("22298006")),
            vec![MYOCARDIAL_INFARCTION]
        );
    }

    #[test]
    fn test_active_concepts_rank_first() {
        let fixture = loaded();
        let request =
            ExpandRequest::new(ComposeSpec::new().include_codes([OLD_MI, MYOCARDIAL_INFARCTION]));
        assert_eq!(expand(&fixture.service, request), vec![MYOCARDIAL_INFARCTION, OLD_MI]);
    }

    #[test]
    fn test_excludes() {
        let fixture = loaded();
        let compose = ComposeSpec::new()
            .include_ecl("<< 404684003")
            .exclude_ecl("<< 64572001");
        assert_eq!(expand(&fixture.service, ExpandRequest::new(compose)), vec![CLINICAL_FINDING]);

        let compose = ComposeSpec::new()
            .include_ecl("<< 404684003")
            .exclude_codes([DISEASE]);
        assert_eq!(
            expand(&fixture.service, ExpandRequest::new(compose)),
            vec![CLINICAL_FINDING, MYOCARDIAL_INFARCTION]
        );
    }

    #[test]
    fn test_includes_intersect() {
        let fixture = loaded();
        let compose = ComposeSpec::new()
            .include_ecl("< 123037004")
            .include_codes([MIDDLE_EAR]);
        assert_eq!(expand(&fixture.service, ExpandRequest::new(compose)), vec![MIDDLE_EAR]);

        let disjoint = ComposeSpec::new()
            .include_ecl("< 123037004")
            .include_codes([MYOCARDIAL_INFARCTION]);
        assert!(expand(&fixture.service, ExpandRequest::new(disjoint)).is_empty());
    }

    #[test]
    fn test_paging() {
        let fixture = loaded();
        let request = |offset| {
            ExpandRequest::new(ComposeSpec::new().include_ecl("< 123037004"))
                .with_page(offset, Some(1))
        };
        let first = fixture.service.expand(&request(0)).unwrap();
        let second = fixture.service.expand(&request(1)).unwrap();
        let third = fixture.service.expand(&request(2)).unwrap();

        assert_eq!(first.total, 2);
        assert_eq!(second.total, 2);
        assert_eq!(second.offset, 1);
        // Equal term lengths: id order decides.
        assert_eq!(first.ids(), vec![MIDDLE_EAR]);
        assert_eq!(second.ids(), vec![MYOCARDIUM]);
        assert!(third.concepts.is_empty());
    }

    #[test]
    fn test_designations() {
        let fixture = loaded();
        let request = ExpandRequest::new(ComposeSpec::new().include_codes([MIDDLE_EAR]));

        let bare = fixture.service.expand(&request).unwrap();
        assert!(bare.concepts[0].concept.descriptions.is_empty());
        assert_eq!(bare.concepts[0].display.as_deref(), Some("Middle ear structure"));

        let full = fixture.service.expand(&request.with_designations(true)).unwrap();
        assert_eq!(full.concepts[0].concept.descriptions.len(), 3);
    }

    #[test]
    fn test_invalid_requests() {
        let fixture = loaded();
        assert!(matches!(
            fixture.service.expand(&ExpandRequest::new(ComposeSpec::new())),
            Err(QueryError::InvalidParameter(_))
        ));
        assert!(matches!(
            fixture.service.expand(&everything().with_page(0, Some(51))),
            Err(QueryError::InvalidParameter(_))
        ));
        assert!(matches!(
            fixture
                .service
                .expand(&ExpandRequest::new(ComposeSpec::new().include_ecl("<< 1 {{ M x = 1 }}"))),
            Err(QueryError::UnsupportedFeature { .. })
        ));
    }
}

mod normal_forms {
    use super::*;

    #[test]
    fn test_render() {
        let fixture = loaded();
        let service = &fixture.service;

        let root = service.concept(ROOT).unwrap().unwrap();
        assert_eq!(service.render_normal_form(&root, false).unwrap(), "<<< 138875005");

        let mi = service.concept(MYOCARDIAL_INFARCTION).unwrap().unwrap();
        assert_eq!(
            service.render_normal_form(&mi, false).unwrap(),
            "=== 64572001 : { 116676008 = 55641003, 363698007 = 74281007 }"
        );
        assert_eq!(
            service.render_normal_form(&mi, true).unwrap(),
            "=== 64572001|Disease| : { 116676008|Associated morphology| = 55641003|Infarct|, \
             363698007|Finding site| = 74281007|Myocardium structure| }"
        );
    }
}

mod reimport {
    use super::*;

    #[test]
    fn test_reimport_replaces_release_and_cached_sets() {
        let config = TerminologyConfig::builder()
            .with_cache(CacheConfig {
                max_entries: 100,
                ttl: Duration::from_secs(60),
            })
            .build();
        let fixture = load(&clinical_release(), config);
        let service = &fixture.service;
        assert_eq!(
            ids(service, "< 404684003 : 363698007 = << 123037004"),
            vec![MYOCARDIAL_INFARCTION]
        );

        // Second release: the finding site moves to the middle ear.
        let mut release = clinical_release();
        release.relationships.retain(|row| !row.contains(&format!("\t{MYOCARDIUM}\t1\t")));
        release.relationship(1, MYOCARDIAL_INFARCTION, FINDING_SITE, MIDDLE_EAR);
        let release_dir = tempdir().unwrap();
        release.write_to(release_dir.path());
        service
            .import(
                vec![Box::new(DirectoryRelease::new(release_dir.path()))],
                "http://snomed.info/sct/900000000000207008/version/20240731",
            )
            .unwrap();

        assert_eq!(
            service.code_system_metadata().unwrap().unwrap().version_date,
            "20240731"
        );
        assert_eq!(
            ids(service, "< 404684003 : 363698007 = << 123037004"),
            vec![MYOCARDIAL_INFARCTION]
        );
        assert!(ids(service, "< 404684003 : 363698007 = 74281007").is_empty());
        assert_eq!(
            ids(service, "< 404684003 : 363698007 = 25342003"),
            vec![MYOCARDIAL_INFARCTION]
        );
    }

    #[test]
    fn test_failed_reimport_keeps_previous_release() {
        let fixture = loaded();
        let service = &fixture.service;
        let missing: Vec<Box<dyn ReleaseArchive>> =
            vec![Box::new(DirectoryRelease::new("/nonexistent/release"))];
        assert!(service.import(missing, VERSION).is_err());

        assert!(service.is_loaded());
        assert_eq!(ids(service, "<< 64572001"), vec![MYOCARDIAL_INFARCTION, DISEASE]);
    }
}
