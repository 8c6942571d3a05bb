mod collective {
    pub mod helpers;

    mod abort;
    mod barrier;
    mod broadcast;
    mod pipeline;
    mod scatter_gather;
}
