mod fakes;

mod pipeline;
mod refiner;
