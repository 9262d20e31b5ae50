//! Integration tests for the desk over the in-memory store.
//!
//! Tests: input → validation → store → re-read derived availability
//!
//! Verifies:
//! - external_id presence and uniqueness surface as `external_id` validation errors
//! - available inventory tracks checkouts and returns after re-reading
//! - associations (movie rentals/customers, customer rentals)

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Days, NaiveDate};
    use proptest::prelude::*;

    use videostore_catalog::{Movie, MovieChanges, NewMovie};
    use videostore_core::{CustomerId, DomainError, ExpectedVersion, MovieId, RentalId, ViolationKind};
    use videostore_customers::{Customer, NewCustomer};
    use videostore_observability::{LogConfig, LogFormat};
    use videostore_rentals::{CheckOut, Rental, RentalStatus};

    use crate::desk::{DeskError, RentalDesk};
    use crate::fixtures::{self, CUSTOMER_ONE, CUSTOMER_TWO, MOVIE_ONE, MOVIE_TWO};
    use crate::in_memory::InMemoryStore;
    use crate::repository::{
        CustomerRepository, MovieRepository, RentalRepository, Store, StoreError, StoreResult,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn hidden_figures() -> NewMovie {
        NewMovie {
            title: "Hidden Figures".to_string(),
            overview: "Some text".to_string(),
            release_date: NaiveDate::from_ymd_opt(1960, 6, 16),
            inventory: 8,
            external_id: Some(100),
        }
    }

    fn checkout(movie_id: MovieId, customer_id: CustomerId) -> CheckOut {
        CheckOut {
            movie_id,
            customer_id,
            checkout_date: today(),
            due_date: today() + Days::new(7),
        }
    }

    async fn setup() -> RentalDesk<Arc<InMemoryStore>> {
        videostore_observability::init_with(&LogConfig {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
        });
        let store = Arc::new(InMemoryStore::new());
        fixtures::seed(&*store).await.unwrap();
        RentalDesk::new(store)
    }

    fn expect_validation(err: DeskError) -> videostore_core::ValidationErrors {
        match err {
            DeskError::Domain(DomainError::Validation(errors)) => errors,
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    // ── Construction & associations ────────────────────────

    #[tokio::test]
    async fn movie_can_be_created() {
        let desk = setup().await;
        let movie = desk.register_movie(hidden_figures()).await.unwrap();
        assert_eq!(movie.version, 1);
        assert_eq!(desk.movie(movie.id).await.unwrap(), movie);
    }

    #[tokio::test]
    async fn movie_has_rentals_and_customers() {
        let desk = setup().await;
        let first = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        desk.check_out(checkout(MOVIE_ONE, CUSTOMER_TWO)).await.unwrap();
        desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        desk.check_in(first.id, today()).await.unwrap();

        let rentals = desk.movie_rentals(MOVIE_ONE).await.unwrap();
        assert_eq!(rentals.len(), 3);
        assert!(rentals.iter().all(|r| r.movie_id == MOVIE_ONE));

        let customers = desk.movie_customers(MOVIE_ONE).await.unwrap();
        let mut ids: Vec<_> = customers.iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![CUSTOMER_ONE, CUSTOMER_TWO];
        expected.sort();
        assert_eq!(ids, expected);

        assert_eq!(desk.customer_rentals(CUSTOMER_ONE).await.unwrap().len(), 2);
        assert!(desk.movie_customers(MOVIE_TWO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn associations_of_unknown_movie_are_not_found() {
        let desk = setup().await;
        let err = desk.movie_rentals(MovieId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    // ── Validation ─────────────────────────────────────────

    #[tokio::test]
    async fn cannot_create_movie_with_duplicate_external_id() {
        let desk = setup().await;
        desk.register_movie(hidden_figures()).await.unwrap();

        let duplicate = NewMovie {
            title: "Hello World".to_string(),
            overview: "test test test".to_string(),
            release_date: NaiveDate::from_ymd_opt(2019, 12, 12),
            inventory: 8,
            external_id: Some(100),
        };
        let errors = expect_validation(desk.register_movie(duplicate).await.unwrap_err());
        assert!(errors.contains("external_id"));
        assert!(errors.messages_for("external_id").contains(&"has already been taken"));
        assert_eq!(desk.movies().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cannot_create_movie_without_external_id() {
        let desk = setup().await;
        let missing = NewMovie {
            title: "Hello World".to_string(),
            overview: "test test test".to_string(),
            release_date: NaiveDate::from_ymd_opt(2019, 12, 12),
            inventory: 8,
            external_id: None,
        };
        let errors = expect_validation(desk.register_movie(missing).await.unwrap_err());
        assert!(errors.contains("external_id"));
        assert!(errors.has("external_id", ViolationKind::Blank));
    }

    #[tokio::test]
    async fn store_level_unique_violation_maps_to_validation_error() {
        // Bypass the desk pre-flight: the store index is what rejects it.
        let desk = setup().await;
        let mut clash = fixtures::movie_one();
        clash.id = MovieId::new();
        let err: DeskError = desk.store().insert_movie(clash).await.unwrap_err().into();
        let errors = expect_validation(err);
        assert!(errors.has("external_id", ViolationKind::Taken));
    }

    #[tokio::test]
    async fn editing_external_id_onto_another_movie_is_rejected() {
        let desk = setup().await;
        let err = desk
            .update_movie(
                MOVIE_TWO,
                MovieChanges {
                    external_id: Some(1),
                    ..MovieChanges::default()
                },
                ExpectedVersion::Any,
            )
            .await
            .unwrap_err();
        assert!(expect_validation(err).has("external_id", ViolationKind::Taken));
    }

    #[tokio::test]
    async fn stale_movie_edit_is_conflict() {
        let desk = setup().await;
        let edit = MovieChanges {
            inventory: Some(12),
            ..MovieChanges::default()
        };
        let updated = desk
            .update_movie(MOVIE_ONE, edit.clone(), ExpectedVersion::Exact(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.inventory, 12);

        let err = desk
            .update_movie(MOVIE_ONE, edit, ExpectedVersion::Exact(1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn checkout_requires_existing_movie_and_customer() {
        let desk = setup().await;
        let errors = expect_validation(
            desk.check_out(checkout(MovieId::new(), CustomerId::new()))
                .await
                .unwrap_err(),
        );
        assert_eq!(errors.messages_for("movie"), vec!["must exist"]);
        assert_eq!(errors.messages_for("customer"), vec!["must exist"]);
    }

    #[tokio::test]
    async fn register_customer_validates_name() {
        let desk = setup().await;
        let err = desk
            .register_customer(NewCustomer::default())
            .await
            .unwrap_err();
        assert!(expect_validation(err).has("name", ViolationKind::Blank));
        assert_eq!(desk.customers().await.unwrap().len(), 2);
    }

    // ── available_inventory ────────────────────────────────

    #[tokio::test]
    async fn matches_inventory_when_nothing_is_checked_out() {
        let desk = setup().await;
        desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        desk.store().clear_rentals().await.unwrap();

        for movie in desk.movies().await.unwrap() {
            assert_eq!(desk.available_inventory(movie.id).await.unwrap(), movie.inventory);
        }
    }

    #[tokio::test]
    async fn decreases_when_a_movie_is_checked_out() {
        let desk = setup().await;
        let before = desk.available_inventory(MOVIE_ONE).await.unwrap();

        let rental = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        assert_eq!(rental.status(), RentalStatus::Outstanding);

        let after = desk.available_inventory(MOVIE_ONE).await.unwrap();
        assert_eq!(after, before - 1);
        // Other titles are unaffected.
        assert_eq!(desk.available_inventory(MOVIE_TWO).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn increases_when_a_movie_is_checked_in() {
        let desk = setup().await;
        let rental = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        let before = desk.available_inventory(MOVIE_ONE).await.unwrap();

        let returned = desk.check_in(rental.id, today() + Days::new(2)).await.unwrap();
        assert!(returned.returned);
        assert_eq!(returned.version, 2);

        let after = desk.available_inventory(MOVIE_ONE).await.unwrap();
        assert_eq!(after, before + 1);
    }

    #[tokio::test]
    async fn end_to_end_checkout_and_return() {
        let desk = setup().await;
        let movie = desk.register_movie(hidden_figures()).await.unwrap();
        assert_eq!(desk.available_inventory(movie.id).await.unwrap(), 8);

        let rental = desk.check_out(checkout(movie.id, CUSTOMER_ONE)).await.unwrap();
        assert_eq!(desk.available_inventory(movie.id).await.unwrap(), 7);

        desk.check_in(rental.id, today()).await.unwrap();
        assert_eq!(desk.available_inventory(movie.id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn returning_twice_is_conflict_and_keeps_availability() {
        let desk = setup().await;
        let rental = desk.check_out(checkout(MOVIE_TWO, CUSTOMER_TWO)).await.unwrap();
        desk.check_in(rental.id, today()).await.unwrap();

        let err = desk.check_in(rental.id, today()).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(desk.available_inventory(MOVIE_TWO).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn check_in_of_unknown_rental_is_not_found() {
        let desk = setup().await;
        let err = desk.check_in(RentalId::new(), today()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn overbooking_is_recorded_and_goes_negative() {
        let desk = setup().await;
        let movie = desk
            .register_movie(NewMovie {
                inventory: 1,
                external_id: Some(7),
                ..hidden_figures()
            })
            .await
            .unwrap();
        desk.check_out(checkout(movie.id, CUSTOMER_ONE)).await.unwrap();
        desk.check_out(checkout(movie.id, CUSTOMER_TWO)).await.unwrap();

        let availability = desk.availability(movie.id).await.unwrap();
        assert_eq!(availability.outstanding, 2);
        assert_eq!(availability.available, -1);
        assert!(availability.is_overbooked());
    }

    #[tokio::test]
    async fn lowering_inventory_is_reflected_on_next_read() {
        let desk = setup().await;
        desk.check_out(checkout(MOVIE_TWO, CUSTOMER_ONE)).await.unwrap();
        desk.update_movie(
            MOVIE_TWO,
            MovieChanges {
                inventory: Some(2),
                ..MovieChanges::default()
            },
            ExpectedVersion::Any,
        )
        .await
        .unwrap();
        assert_eq!(desk.available_inventory(MOVIE_TWO).await.unwrap(), 1);
    }

    // ── Removal & overdue ──────────────────────────────────

    #[tokio::test]
    async fn movie_with_outstanding_rentals_cannot_be_removed() {
        let desk = setup().await;
        desk.check_out(checkout(MOVIE_TWO, CUSTOMER_ONE)).await.unwrap();
        let err = desk.remove_movie(MOVIE_TWO).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(desk.movie(MOVIE_TWO).await.is_ok());
    }

    #[tokio::test]
    async fn movie_without_rentals_can_be_removed() {
        let desk = setup().await;
        let movie = desk.register_movie(hidden_figures()).await.unwrap();
        desk.remove_movie(movie.id).await.unwrap();
        assert!(desk.movie(movie.id).await.unwrap_err().is_not_found());
        // The external id is free again.
        desk.register_movie(hidden_figures()).await.unwrap();
    }

    #[tokio::test]
    async fn movie_whose_rentals_were_returned_can_be_removed() {
        let desk = setup().await;
        let rental = desk.check_out(checkout(MOVIE_TWO, CUSTOMER_ONE)).await.unwrap();
        desk.check_in(rental.id, today()).await.unwrap();
        assert_eq!(desk.store().count_outstanding(MOVIE_TWO).await.unwrap(), 0);

        desk.remove_movie(MOVIE_TWO).await.unwrap();
        assert!(desk.movie(MOVIE_TWO).await.unwrap_err().is_not_found());
        assert!(desk.rental(rental.id).await.unwrap_err().is_not_found());
        assert!(desk.customer_rentals(CUSTOMER_ONE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_refusal_to_delete_is_a_conflict() {
        let desk = setup().await;
        desk.check_out(checkout(MOVIE_TWO, CUSTOMER_ONE)).await.unwrap();

        let err: DeskError = desk
            .store()
            .delete_movie(MOVIE_TWO)
            .await
            .unwrap_err()
            .into();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn overdue_lists_only_outstanding_past_due() {
        let desk = setup().await;
        let late = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        let back = desk.check_out(checkout(MOVIE_TWO, CUSTOMER_TWO)).await.unwrap();
        desk.check_in(back.id, today() + Days::new(3)).await.unwrap();

        let overdue = desk.overdue_rentals(today() + Days::new(10)).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, late.id);

        assert!(desk.overdue_rentals(today() + Days::new(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn desk_works_over_dyn_store() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        fixtures::seed(&*store).await.unwrap();
        let desk = RentalDesk::new(store);
        assert_eq!(desk.available_inventory(MOVIE_ONE).await.unwrap(), 10);
    }

    /// In-memory store whose outstanding count always fails.
    struct FailingCount(InMemoryStore);

    #[async_trait]
    impl MovieRepository for FailingCount {
        async fn insert_movie(&self, movie: Movie) -> StoreResult<Movie> {
            self.0.insert_movie(movie).await
        }

        async fn get_movie(&self, id: MovieId) -> StoreResult<Option<Movie>> {
            self.0.get_movie(id).await
        }

        async fn find_movie_by_external_id(&self, external_id: i64) -> StoreResult<Option<Movie>> {
            self.0.find_movie_by_external_id(external_id).await
        }

        async fn list_movies(&self) -> StoreResult<Vec<Movie>> {
            self.0.list_movies().await
        }

        async fn update_movie(&self, movie: Movie, expected: ExpectedVersion) -> StoreResult<Movie> {
            self.0.update_movie(movie, expected).await
        }

        async fn delete_movie(&self, id: MovieId) -> StoreResult<()> {
            self.0.delete_movie(id).await
        }
    }

    #[async_trait]
    impl CustomerRepository for FailingCount {
        async fn insert_customer(&self, customer: Customer) -> StoreResult<Customer> {
            self.0.insert_customer(customer).await
        }

        async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
            self.0.get_customer(id).await
        }

        async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
            self.0.list_customers().await
        }
    }

    #[async_trait]
    impl RentalRepository for FailingCount {
        async fn insert_rental(&self, rental: Rental) -> StoreResult<Rental> {
            self.0.insert_rental(rental).await
        }

        async fn get_rental(&self, id: RentalId) -> StoreResult<Option<Rental>> {
            self.0.get_rental(id).await
        }

        async fn update_rental(&self, rental: Rental, expected: ExpectedVersion) -> StoreResult<Rental> {
            self.0.update_rental(rental, expected).await
        }

        async fn rentals_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Rental>> {
            self.0.rentals_for_movie(movie_id).await
        }

        async fn rentals_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Rental>> {
            self.0.rentals_for_customer(customer_id).await
        }

        async fn customers_for_movie(&self, movie_id: MovieId) -> StoreResult<Vec<Customer>> {
            self.0.customers_for_movie(movie_id).await
        }

        async fn count_outstanding(&self, _movie_id: MovieId) -> StoreResult<u64> {
            Err(StoreError::Backend("timeout".to_string()))
        }

        async fn list_outstanding(&self) -> StoreResult<Vec<Rental>> {
            self.0.list_outstanding().await
        }

        async fn clear_rentals(&self) -> StoreResult<u64> {
            self.0.clear_rentals().await
        }
    }

    #[tokio::test]
    async fn committed_checkout_survives_failed_availability_read() {
        let store = Arc::new(FailingCount(InMemoryStore::new()));
        fixtures::seed(&*store).await.unwrap();
        let desk = RentalDesk::new(store);

        let rental = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
        assert!(rental.is_outstanding());

        let committed = desk.store().rentals_for_movie(MOVIE_ONE).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].id, rental.id);

        // Reads that need the count still report the failure.
        let err = desk.available_inventory(MOVIE_ONE).await.unwrap_err();
        assert!(matches!(err, DeskError::Store(StoreError::Backend(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of checkouts and returns, availability equals
        /// inventory minus the rentals still out.
        #[test]
        fn availability_tracks_outstanding(ops in prop::collection::vec(any::<bool>(), 1..30)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let desk = setup().await;
                let mut out: Vec<RentalId> = Vec::new();

                for checkout_op in ops {
                    if checkout_op || out.is_empty() {
                        let r = desk.check_out(checkout(MOVIE_ONE, CUSTOMER_ONE)).await.unwrap();
                        out.push(r.id);
                    } else if let Some(id) = out.pop() {
                        desk.check_in(id, today()).await.unwrap();
                    }
                    let available = desk.available_inventory(MOVIE_ONE).await.unwrap();
                    assert_eq!(available, 10 - out.len() as i64);
                }
            });
        }
    }
}
