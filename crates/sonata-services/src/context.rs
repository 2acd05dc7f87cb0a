//! Service wiring.

use sonata_core::{Config, HashIdGenerator, IdGenerator};
use sonata_db::{
    setup_database, AnalysisRepository, AnalysisTypeRepository, DonorRepository, FileRepository,
    InMemoryStore, PostgresAnalysisRepository, PostgresAnalysisTypeRepository,
    PostgresDonorRepository, PostgresFileRepository, PostgresSampleRepository,
    PostgresSpecimenRepository, PostgresStudyRepository, PostgresUploadRepository,
    SampleRepository, SpecimenRepository, StudyRepository, UploadRepository,
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::services::analysis::AnalysisStores;
use crate::services::{
    AnalysisService, AnalysisTypeService, FileModificationService, IdResolver,
    JsonSchemaValidator, SchemaValidator, StudyService, UploadService, ValidationService,
};

/// One repository per entity kind, all sharing the same backend.
#[derive(Clone)]
pub struct Repositories {
    pub studies: Arc<dyn StudyRepository>,
    pub uploads: Arc<dyn UploadRepository>,
    pub analysis_types: Arc<dyn AnalysisTypeRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub donors: Arc<dyn DonorRepository>,
    pub specimens: Arc<dyn SpecimenRepository>,
    pub samples: Arc<dyn SampleRepository>,
    pub files: Arc<dyn FileRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            studies: Arc::new(PostgresStudyRepository::new(pool.clone())),
            uploads: Arc::new(PostgresUploadRepository::new(pool.clone())),
            analysis_types: Arc::new(PostgresAnalysisTypeRepository::new(pool.clone())),
            analyses: Arc::new(PostgresAnalysisRepository::new(pool.clone())),
            donors: Arc::new(PostgresDonorRepository::new(pool.clone())),
            specimens: Arc::new(PostgresSpecimenRepository::new(pool.clone())),
            samples: Arc::new(PostgresSampleRepository::new(pool.clone())),
            files: Arc::new(PostgresFileRepository::new(pool)),
        }
    }

    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            studies: Arc::new(store.clone()),
            uploads: Arc::new(store.clone()),
            analysis_types: Arc::new(store.clone()),
            analyses: Arc::new(store.clone()),
            donors: Arc::new(store.clone()),
            specimens: Arc::new(store.clone()),
            samples: Arc::new(store.clone()),
            files: Arc::new(store),
        }
    }
}

/// Every service of the workflow, built over one set of repositories.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<Config>,
    pub repositories: Repositories,
    pub studies: StudyService,
    pub analysis_types: AnalysisTypeService,
    pub validation: ValidationService,
    pub analyses: AnalysisService,
    pub uploads: UploadService,
    pub files: FileModificationService,
}

impl ServiceContext {
    pub fn new(
        config: Config,
        repositories: Repositories,
        ids: Arc<dyn IdGenerator>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        let resolver = IdResolver::new(ids);
        let studies = StudyService::new(repositories.studies.clone());
        let analysis_types =
            AnalysisTypeService::new(repositories.analysis_types.clone(), validator.clone());
        let validation = ValidationService::new(
            repositories.uploads.clone(),
            analysis_types.clone(),
            validator,
            config.validation_mode,
        );
        let analyses = AnalysisService::new(
            AnalysisStores {
                analyses: repositories.analyses.clone(),
                donors: repositories.donors.clone(),
                specimens: repositories.specimens.clone(),
                samples: repositories.samples.clone(),
                files: repositories.files.clone(),
            },
            studies.clone(),
            analysis_types.clone(),
            resolver.clone(),
            config.analysis_resave_policy,
        );
        let uploads = UploadService::new(
            repositories.uploads.clone(),
            studies.clone(),
            validation.clone(),
            analyses.clone(),
            resolver,
            config.retain_saved_payload,
        );
        let files = FileModificationService::new(
            repositories.files.clone(),
            repositories.analyses.clone(),
            studies.clone(),
        );

        Self {
            config: Arc::new(config),
            repositories,
            studies,
            analysis_types,
            validation,
            analyses,
            uploads,
            files,
        }
    }

    /// Connect to PostgreSQL, apply migrations and build the services.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let pool = setup_database(&config).await?;
        let ids = Arc::new(HashIdGenerator::new(config.id_namespace.clone()));
        Ok(Self::new(
            config,
            Repositories::postgres(pool),
            ids,
            Arc::new(JsonSchemaValidator),
        ))
    }

    /// Services over a fresh in-memory store.
    pub fn in_memory(config: Config) -> Self {
        let ids = Arc::new(HashIdGenerator::new(config.id_namespace.clone()));
        Self::new(
            config,
            Repositories::in_memory(InMemoryStore::new()),
            ids,
            Arc::new(JsonSchemaValidator),
        )
    }
}
